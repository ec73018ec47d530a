//! Cache keys for entity reads. A mutation invalidates by prefix, so `device()`
//! covers every `["device", id]` entry.

use crate::query::QueryKey;

use super::models::TicketFilter;

pub fn devices() -> QueryKey { QueryKey::from("devices") }
pub fn admin_devices() -> QueryKey { QueryKey::from("admin-devices") }
pub fn device() -> QueryKey { QueryKey::from("device") }
pub fn device_by_id(id: i64) -> QueryKey { device().with(id) }
pub fn device_types() -> QueryKey { QueryKey::from("device-types") }

pub fn priorities() -> QueryKey { QueryKey::from("priorities") }
pub fn admin_priorities() -> QueryKey { QueryKey::from("admin-priorities") }
pub fn admin_priority() -> QueryKey { QueryKey::from("admin-priority") }

pub fn statuses() -> QueryKey { QueryKey::from("statuses") }
pub fn admin_statuses() -> QueryKey { QueryKey::from("admin-statuses") }
pub fn admin_status() -> QueryKey { QueryKey::from("admin-status") }

pub fn admin_roles() -> QueryKey { QueryKey::from("admin-roles") }
pub fn admin_role() -> QueryKey { QueryKey::from("admin-role") }

pub fn admin_users() -> QueryKey { QueryKey::from("admin-users") }
pub fn admin_user() -> QueryKey { QueryKey::from("admin-user") }

pub fn tickets() -> QueryKey { QueryKey::from("tickets") }
pub fn ticket() -> QueryKey { QueryKey::from("ticket") }
pub fn ticket_by_id(id: i64) -> QueryKey { ticket().with(id) }

/// `["tickets"]` for the unfiltered list, `["tickets", "status_id=1", ...]` otherwise.
pub fn tickets_filtered(filter: &TicketFilter) -> QueryKey {
    filter.pairs().into_iter().fold(tickets(), |key, (k, v)| key.with(format!("{}={}", k, v)))
}
