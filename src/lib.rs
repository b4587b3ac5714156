pub mod archive;
pub mod cleanup;
pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod unpack;

#[cfg(test)]
pub(crate) mod test_utils;
