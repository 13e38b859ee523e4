pub const REFERENCE: &'static str = include_str!("../membership.toml");

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod machine;
pub mod member_table;
pub mod membership;
pub mod store;
pub mod watchdog;
pub mod watcher;

#[cfg(test)]
mod test {
    use tracing::Level;

    use fleet_core::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
