pub mod api;
pub mod client;
pub mod config;
pub mod session;
pub mod web;

use config::Config;
use session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new(&config.session, config.server.environment);
        Self { config, sessions }
    }
}
