pub mod conflict;
pub mod epub;
pub mod importer;
pub mod loader;
pub mod migration;
pub mod session;
pub mod splitter;
