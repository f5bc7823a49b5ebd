pub mod registry {
    tonic::include_proto!("registry");
}
pub mod user {
    tonic::include_proto!("user");
}
pub mod expense {
    tonic::include_proto!("expense");
}

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod services;
