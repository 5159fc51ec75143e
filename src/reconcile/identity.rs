// Owner display-name resolution.
//
// Platforms report team names inconsistently: some rosters carry a
// user-set name, some only a generic placeholder, some nothing at all.
// Resolution walks a fixed priority chain and always lands on a usable
// name, so the UI never renders a blank card.

use std::collections::HashMap;

use crate::platform::{RosterRecord, UserRecord};

/// True for platform-generated placeholder names like "Team 7". These are
/// skipped in favor of lower-priority sources that might carry a real name.
pub fn is_generic_team_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("Team ") else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Resolve the display name for a roster.
///
/// Priority order:
/// 1. user record matched by owner ID (team name, then display name)
/// 2. roster metadata team name, unless generic
/// 3. roster metadata owner name
/// 4. owner display name from the matched user, unless generic
/// 5. synthesized `"Team {roster_id}"`
pub fn resolve_display_name(
    roster: &RosterRecord,
    users_by_id: &HashMap<&str, &UserRecord>,
) -> String {
    let user = roster
        .owner_id
        .as_deref()
        .and_then(|id| users_by_id.get(id).copied());

    if let Some(user) = user {
        if let Some(team_name) = user.team_name.as_deref() {
            if !team_name.is_empty() && !is_generic_team_name(team_name) {
                return team_name.to_string();
            }
        }
    }

    if let Some(team_name) = roster.team_name.as_deref() {
        if !team_name.is_empty() && !is_generic_team_name(team_name) {
            return team_name.to_string();
        }
    }

    if let Some(owner_name) = roster.owner_display_name.as_deref() {
        if !owner_name.is_empty() {
            return owner_name.to_string();
        }
    }

    if let Some(user) = user {
        if !user.display_name.is_empty() && !is_generic_team_name(&user.display_name) {
            return user.display_name.clone();
        }
    }

    format!("Team {}", roster.roster_id)
}

/// Avatar URL for a roster, from its matched user record.
pub fn resolve_avatar(
    roster: &RosterRecord,
    users_by_id: &HashMap<&str, &UserRecord>,
) -> Option<String> {
    roster
        .owner_id
        .as_deref()
        .and_then(|id| users_by_id.get(id))
        .and_then(|u| u.avatar_url.clone())
}

/// Index user records by user ID for repeated roster lookups.
pub fn index_users(users: &[UserRecord]) -> HashMap<&str, &UserRecord> {
    users.iter().map(|u| (u.user_id.as_str(), u)).collect()
}
