mod client;
pub mod colors;
pub mod models;
mod oauth;
mod provider;
pub mod token;

pub use client::GoogleCalendarClient;
pub use models::{RemoteCalendar, RemoteEvent, TaggedRemoteEvent};
pub use oauth::GoogleOAuthClient;
pub use provider::{CalendarProvider, TokenRefresher};
pub use token::TokenManager;
