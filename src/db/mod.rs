pub mod init;
pub mod preferences;

#[cfg(test)]
mod tests;

pub use init::{init_db, migrate, open_db};
pub use preferences::PreferenceRepository;
