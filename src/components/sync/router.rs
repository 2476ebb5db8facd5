//! Decides which calendar an event lives on, and with what color and title.

use super::models::{CalendarType, Household, MemberProfile};
use super::store::EventStore;
use crate::components::google_calendar::CalendarProvider;
use crate::error::SyncResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolved placement of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub calendar_id: String,
    pub color: String,
    pub display_title: String,
    pub calendar_type: CalendarType,
    /// Single attendee without a bound calendar; the route fell back to the
    /// owner's calendar and a self-heal may find a better one
    pub unbound_attendee: Option<String>,
}

fn find_profile<'a>(profiles: &'a [MemberProfile], id: &str) -> Option<&'a MemberProfile> {
    profiles.iter().find(|p| p.id == id)
}

/// Append the attendee names to a family event title, unless already present
pub fn annotate_title(base: &str, names: &[&str]) -> String {
    if names.is_empty() {
        return base.to_string();
    }

    let suffix = format!(" ({})", names.join(", "));
    if base.ends_with(&suffix) {
        base.to_string()
    } else {
        format!("{}{}", base, suffix)
    }
}

/// Undo [`annotate_title`] on a title read back from the provider
pub fn strip_annotation(title: &str) -> &str {
    if !title.ends_with(')') {
        return title;
    }
    match title.rfind(" (") {
        Some(idx) if idx > 0 => &title[..idx],
        _ => title,
    }
}

/// Route an event. Pure: identical inputs always give the same route.
///
/// - no attendees: the owner's calendar, owner's color
/// - one attendee: that attendee's calendar and color
/// - several attendees: the family calendar and color, with the attendee
///   names appended to the title
pub fn resolve_target(
    title: &str,
    attendees: &[String],
    household: &Household,
    profiles: &[MemberProfile],
    default_color: &str,
) -> Route {
    let owner = find_profile(profiles, &household.owner_profile_id);
    let owner_calendar = owner
        .and_then(|o| o.bound_calendar_id().map(str::to_string).or_else(|| o.email.clone()))
        .unwrap_or_else(|| household.owner_profile_id.clone());

    match attendees {
        [] => Route {
            calendar_id: owner_calendar,
            color: owner
                .map(|o| o.color.clone())
                .unwrap_or_else(|| default_color.to_string()),
            display_title: title.to_string(),
            calendar_type: CalendarType::Personal,
            unbound_attendee: None,
        },
        [single] => {
            let attendee = find_profile(profiles, single);
            let color = attendee
                .map(|a| a.color.clone())
                .unwrap_or_else(|| default_color.to_string());

            match attendee.and_then(MemberProfile::bound_calendar_id) {
                Some(calendar_id) => Route {
                    calendar_id: calendar_id.to_string(),
                    color,
                    display_title: title.to_string(),
                    calendar_type: CalendarType::Personal,
                    unbound_attendee: None,
                },
                None => Route {
                    calendar_id: owner_calendar,
                    color,
                    display_title: title.to_string(),
                    calendar_type: CalendarType::Personal,
                    unbound_attendee: attendee.map(|a| a.id.clone()),
                },
            }
        }
        _ => {
            let names: Vec<&str> = attendees
                .iter()
                .filter_map(|id| find_profile(profiles, id))
                .map(|p| p.display_name.as_str())
                .collect();

            Route {
                calendar_id: household
                    .family_calendar_id
                    .clone()
                    .unwrap_or(owner_calendar),
                color: household
                    .family_color
                    .clone()
                    .unwrap_or_else(|| default_color.to_string()),
                display_title: annotate_title(title, &names),
                calendar_type: CalendarType::Family,
                unbound_attendee: None,
            }
        }
    }
}

/// Router with self-healing of missing attendee bindings
#[derive(Clone)]
pub struct CalendarRouter {
    store: Arc<dyn EventStore>,
    provider: Arc<dyn CalendarProvider>,
    default_color: String,
}

impl CalendarRouter {
    pub fn new(
        store: Arc<dyn EventStore>,
        provider: Arc<dyn CalendarProvider>,
        default_color: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            default_color: default_color.into(),
        }
    }

    /// Resolve the route, binding an unbound single attendee on the way when
    /// the owner's account has a calendar named after them.
    ///
    /// `token` is the owner's access token; without it no self-heal is tried.
    /// Remote failures leave the fallback route in place; failing to persist
    /// a discovered binding is returned as an error.
    pub async fn route(
        &self,
        title: &str,
        attendees: &[String],
        household: &Household,
        profiles: &mut [MemberProfile],
        token: Option<&str>,
    ) -> SyncResult<Route> {
        let route = resolve_target(title, attendees, household, profiles, &self.default_color);

        let (Some(attendee_id), Some(token)) = (route.unbound_attendee.clone(), token) else {
            return Ok(route);
        };

        if self.self_heal(&attendee_id, profiles, token).await? {
            Ok(resolve_target(title, attendees, household, profiles, &self.default_color))
        } else {
            Ok(route)
        }
    }

    /// Find a writable calendar named like the attendee and persist it as
    /// their binding. Returns whether a binding now exists.
    async fn self_heal(
        &self,
        attendee_id: &str,
        profiles: &mut [MemberProfile],
        token: &str,
    ) -> SyncResult<bool> {
        let Some(profile) = profiles.iter_mut().find(|p| p.id == attendee_id) else {
            return Ok(false);
        };
        if profile.bound_calendar_id().is_some() {
            return Ok(true);
        }

        let calendars = match self.provider.list_calendars(token).await {
            Ok(calendars) => calendars,
            Err(e) => {
                warn!("Could not list calendars to bind {}: {}", profile.display_name, e);
                return Ok(false);
            }
        };

        let wanted = profile.display_name.trim().to_lowercase();
        let Some(calendar) = calendars
            .iter()
            .filter(|c| c.is_writable())
            .find(|c| c.display_name().trim().to_lowercase() == wanted)
        else {
            debug!("No calendar named after {}", profile.display_name);
            return Ok(false);
        };

        // Stored credentials may be newer than `profile`; write only the pointer
        if !self
            .store
            .set_selected_calendar(&profile.household_id, &profile.id, &calendar.id)
            .await?
        {
            return Ok(false);
        }
        profile
            .calendar
            .get_or_insert_with(Default::default)
            .selected_calendar_id = Some(calendar.id.clone());

        info!(
            "Bound calendar {} to profile {} ({})",
            calendar.id, profile.id, profile.display_name
        );
        Ok(true)
    }
}
