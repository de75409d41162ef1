pub mod schema;

pub use schema::{
    AccountConfig, AgentConfig, AgentsConfig, ChannelsConfig, Config, CronConfig, DiscordConfig,
    LoggingConfig, MatrixConfig, TelegramConfig,
};
