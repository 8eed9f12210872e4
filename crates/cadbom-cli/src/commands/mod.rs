pub mod assembly;
pub mod explode;
pub mod purge;
pub mod serve;
pub mod summary;
pub mod tree;
