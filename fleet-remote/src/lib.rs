pub const REFERENCE: &'static str = include_str!("../remote.toml");

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod processor;

#[cfg(test)]
mod test {
    use tracing::Level;

    use fleet_core::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
