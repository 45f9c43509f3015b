pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod graphql;
pub mod identity;
pub mod ledger;
pub mod projection;
pub mod routes;
pub mod state;
pub mod store;
