//! Discord integration for BroBot.
//!
//! This crate provides the Discord-facing surface:
//! - **Gateway** (`gateway`) - event loop with reconnection logic and live status counters
//! - **Slash commands** (`commands`) - `/review`, `/mes-reviews`, `/news-config` definitions
//!   and inbound interaction parsing
//! - **Embeds & modals** (`embeds`) - outbound message payload builders
//! - **REST client** (`api`) - the subset of the Discord HTTP API the bot uses
//! - **Handlers** (`handlers`) - routes interactions to the command service and
//!   translates domain errors into user-facing replies
//!
//! # Key Types
//!
//! - `GatewayRunner` - event loop with reconnection logic
//! - `CommandService` - trait the application implements to back the commands
//! - `InteractionHandler` - parses, routes, responds
//! - `DiscordApi` - outbound REST calls (messages, threads, reactions)

pub mod api;
pub mod commands;
pub mod embeds;
pub mod gateway;
pub mod handlers;
