mod app;
mod config;
mod domain;
mod infra;
mod ui;
mod usecase;


use crate::app::App;
use crate::config::{default_webview_data_dir, AppConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().unwrap_or_else(|err| {
        log::error!("failed to load config, using defaults: {err:#}");
        AppConfig::default()
    });
    log::info!("using api at {}", config.api_base_url);

    let mut desktop = dioxus::desktop::Config::new()
        .with_window(dioxus::desktop::WindowBuilder::new().with_title("Finsheet"));
    match default_webview_data_dir() {
        Ok(dir) => desktop = desktop.with_data_directory(dir),
        Err(err) => log::warn!("no webview data directory: {err:#}"),
    }

    dioxus::LaunchBuilder::desktop()
        .with_cfg(desktop)
        .with_context(config)
        .launch(App);
}
