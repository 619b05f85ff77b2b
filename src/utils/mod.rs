pub mod blocking;
pub mod data_uri;
pub mod logger;
pub mod temp;
