use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog;
use crate::config;
use crate::engine::FeedEngine;
use crate::media;
use crate::player::{PlayerFactory, PlayerSettings};
use crate::storage;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

    let media_cfg = media::Config {
        cache_dir: cfg.media.cache_dir.clone(),
        max_size_bytes: cfg.media.max_size_bytes,
        default_ttl: cfg.media.default_ttl,
        workers: cfg.media.workers,
        http_client: None,
    };
    let media_manager = media::Manager::new(store.clone(), media_cfg).ok();
    let media_handle = media_manager.as_ref().map(|manager| manager.handle());

    let _theme = &cfg.ui.theme;

    let items = match cfg.feed.catalog_file.as_ref() {
        Some(path) => catalog::load_file(path)
            .with_context(|| format!("load catalog from {}", path.display()))?,
        None => catalog::builtin(),
    };
    let item_count = items.len();

    let (factory, media_events) = PlayerFactory::new(PlayerSettings {
        mpv_path: cfg.player.mpv_path.clone(),
        extra_args: cfg.player.extra_args.clone(),
    });
    let placement = factory.placement_cell();

    let status: String;
    let engine = match FeedEngine::new(items, Arc::new(factory)) {
        Ok(engine) => {
            status = format!(
                "{item_count} clips loaded. Tap to unmute, hold to pause, pull down to refresh."
            );
            Some(engine)
        }
        Err(catalog::CatalogError::Empty) => {
            status = "The catalog is empty. Nothing to play.".to_string();
            None
        }
    };

    let options = ui::Options {
        engine,
        status_message: status,
        media_handle,
        media_events: Some(media_events),
        placement: Some(placement),
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    drop(media_manager);

    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/reel-tui/config.yaml".to_string()
    }
}
