pub mod core {
    pub mod config;
    pub mod error;
    pub mod orchestrator;
    pub mod tracing_init;
}

pub mod api {
    pub mod client;
}

pub mod engine {
    pub mod decision;
}

pub mod models {
    pub mod state;
    pub mod torrent;
}

pub mod stores {
    pub mod state_store;
}

pub mod utils {
    pub mod time;
}
