pub mod audit;
pub mod config;
pub mod cursor;
pub mod entries;
pub mod feed;
pub mod generate;
pub mod ingest;
pub mod lock;
pub mod parse;
pub mod paths;
pub mod publish;
pub mod util;
pub mod warn;
pub mod watcher;
