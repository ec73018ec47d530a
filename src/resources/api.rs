use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::keys;
use super::models::*;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{Gateway, RequestDescriptor};
use crate::identity::{Principal, SessionContext, SessionResolver, WHO_AM_I_PATH};
use crate::query::{QueryCoordinator, QueryKey};

const DEVICES: &str = "/api/v1/devices";
const ADMIN_DEVICES: &str = "/api/v1/devices/admin/devices";
const DEVICE_TYPES: &str = "/api/device-types";
const ADMIN_DEVICE_TYPES: &str = "/api/admin/device-types";
const PRIORITIES: &str = "/api/v1/priorities";
const ADMIN_PRIORITIES: &str = "/api/v1/priorities/admin/priorities";
const STATUSES: &str = "/api/v1/statuses/statuses";
const ADMIN_STATUSES: &str = "/api/v1/statuses/admin/statuses";
const ADMIN_ROLES: &str = "/api/v1/users/admin/roles";
const ADMIN_USERS: &str = "/api/v1/users/admin/users";
const TICKETS: &str = "/api/v1/tickets";

/// Entity endpoints. Reads are cached in the coordinator; each write invalidates
/// the keys it can affect once the backend accepts it.
#[derive(Clone)]
pub struct HelpdeskApi {
    gateway: Arc<Gateway>,
    queries: QueryCoordinator,
    resolver: Arc<SessionResolver>,
    context: Arc<SessionContext>,
}

impl HelpdeskApi {
    pub fn new(gateway: Arc<Gateway>, queries: QueryCoordinator, resolver: Arc<SessionResolver>, context: Arc<SessionContext>) -> Self {
        Self { gateway, queries, resolver, context }
    }

    pub fn queries(&self) -> &QueryCoordinator { &self.queries }

    async fn read<T>(&self, key: QueryKey, req: RequestDescriptor) -> ApiResult<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let gateway = Arc::clone(&self.gateway);
        self.queries
            .query(key, move || {
                let gateway = Arc::clone(&gateway);
                let req = req.clone();
                async move { gateway.send_json::<T>(req).await }
            })
            .await
            .into_result()
    }

    async fn write<T: DeserializeOwned>(&self, req: RequestDescriptor, affected: &[QueryKey]) -> ApiResult<T> {
        self.queries.mutate_and_invalidate(self.gateway.send_json::<T>(req), affected).await
    }

    async fn write_empty(&self, req: RequestDescriptor, affected: &[QueryKey]) -> ApiResult<()> {
        self.queries.mutate_and_invalidate(self.gateway.send_empty(req), affected).await
    }

    fn body<B: Serialize>(req: RequestDescriptor, body: &B) -> ApiResult<RequestDescriptor> { req.json(body) }

    // ---- devices ----

    pub async fn devices(&self) -> ApiResult<Arc<Vec<Device>>> {
        self.read(keys::devices(), RequestDescriptor::get(DEVICES)).await
    }

    pub async fn device(&self, id: i64) -> ApiResult<Arc<Device>> {
        self.read(keys::device_by_id(id), RequestDescriptor::get(format!("{}/{}", DEVICES, id))).await
    }

    pub async fn admin_devices(&self) -> ApiResult<Arc<Vec<Device>>> {
        self.read(keys::admin_devices(), RequestDescriptor::get(ADMIN_DEVICES)).await
    }

    pub async fn create_device(&self, input: &DeviceCreate) -> ApiResult<Device> {
        let req = Self::body(RequestDescriptor::post(ADMIN_DEVICES), input)?;
        self.write(req, &[keys::admin_devices(), keys::devices()]).await
    }

    pub async fn update_device(&self, id: i64, input: &DeviceUpdate) -> ApiResult<Device> {
        let req = Self::body(RequestDescriptor::put(format!("{}/{}", ADMIN_DEVICES, id)), input)?;
        self.write(req, &[keys::admin_devices(), keys::devices(), keys::device_by_id(id), keys::tickets(), keys::ticket()]).await
    }

    pub async fn delete_device(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_DEVICES, id));
        self.write_empty(req, &[keys::admin_devices(), keys::devices(), keys::device_by_id(id), keys::tickets(), keys::ticket()]).await
    }

    // ---- device types ----

    pub async fn device_types(&self) -> ApiResult<Arc<Vec<DeviceType>>> {
        self.read(keys::device_types(), RequestDescriptor::get(DEVICE_TYPES)).await
    }

    pub async fn create_device_type(&self, input: &DeviceTypeCreate) -> ApiResult<DeviceType> {
        let req = Self::body(RequestDescriptor::post(ADMIN_DEVICE_TYPES), input)?;
        self.write(req, &[keys::device_types()]).await
    }

    pub async fn delete_device_type(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_DEVICE_TYPES, id));
        self.write_empty(req, &[keys::device_types(), keys::admin_devices(), keys::devices(), keys::device()]).await
    }

    // ---- priorities ----

    pub async fn priorities(&self) -> ApiResult<Arc<Vec<Priority>>> {
        self.read(keys::priorities(), RequestDescriptor::get(PRIORITIES)).await
    }

    pub async fn admin_priorities(&self, skip: u32, limit: u32) -> ApiResult<Arc<Vec<Priority>>> {
        let req = RequestDescriptor::get(ADMIN_PRIORITIES).query("skip", skip).query("limit", limit);
        self.read(keys::admin_priorities().with(skip).with(limit), req).await
    }

    pub async fn priority(&self, id: i64) -> ApiResult<Arc<Priority>> {
        self.read(keys::admin_priority().with(id), RequestDescriptor::get(format!("{}/{}", ADMIN_PRIORITIES, id))).await
    }

    pub async fn create_priority(&self, input: &PriorityCreate) -> ApiResult<Priority> {
        let req = Self::body(RequestDescriptor::post(ADMIN_PRIORITIES), input)?;
        self.write(req, &[keys::priorities(), keys::admin_priorities()]).await
    }

    pub async fn update_priority(&self, id: i64, input: &PriorityUpdate) -> ApiResult<Priority> {
        let req = Self::body(RequestDescriptor::put(format!("{}/{}", ADMIN_PRIORITIES, id)), input)?;
        self.write(req, &[keys::priorities(), keys::admin_priorities(), keys::admin_priority().with(id), keys::tickets(), keys::ticket()]).await
    }

    pub async fn delete_priority(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_PRIORITIES, id));
        self.write_empty(req, &[keys::priorities(), keys::admin_priorities(), keys::admin_priority().with(id)]).await
    }

    // ---- statuses ----

    pub async fn statuses(&self) -> ApiResult<Arc<Vec<Status>>> {
        self.read(keys::statuses(), RequestDescriptor::get(STATUSES)).await
    }

    pub async fn admin_statuses(&self, skip: u32, limit: u32) -> ApiResult<Arc<Vec<Status>>> {
        let req = RequestDescriptor::get(ADMIN_STATUSES).query("skip", skip).query("limit", limit);
        self.read(keys::admin_statuses().with(skip).with(limit), req).await
    }

    pub async fn status(&self, id: i64) -> ApiResult<Arc<Status>> {
        self.read(keys::admin_status().with(id), RequestDescriptor::get(format!("{}/{}", ADMIN_STATUSES, id))).await
    }

    pub async fn create_status(&self, input: &StatusCreate) -> ApiResult<Status> {
        let req = Self::body(RequestDescriptor::post(ADMIN_STATUSES), input)?;
        self.write(req, &[keys::statuses(), keys::admin_statuses()]).await
    }

    pub async fn update_status(&self, id: i64, input: &StatusUpdate) -> ApiResult<Status> {
        let req = Self::body(RequestDescriptor::put(format!("{}/{}", ADMIN_STATUSES, id)), input)?;
        self.write(req, &[keys::statuses(), keys::admin_statuses(), keys::admin_status().with(id), keys::tickets(), keys::ticket()]).await
    }

    pub async fn delete_status(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_STATUSES, id));
        self.write_empty(req, &[keys::statuses(), keys::admin_statuses(), keys::admin_status().with(id)]).await
    }

    // ---- roles ----

    pub async fn roles(&self) -> ApiResult<Arc<Vec<Role>>> {
        self.read(keys::admin_roles(), RequestDescriptor::get(ADMIN_ROLES)).await
    }

    pub async fn role(&self, id: i64) -> ApiResult<Arc<Role>> {
        self.read(keys::admin_role().with(id), RequestDescriptor::get(format!("{}/{}", ADMIN_ROLES, id))).await
    }

    pub async fn create_role(&self, input: &RoleCreate) -> ApiResult<Role> {
        let req = Self::body(RequestDescriptor::post(ADMIN_ROLES), input)?;
        self.write(req, &[keys::admin_roles()]).await
    }

    pub async fn update_role(&self, id: i64, input: &RoleUpdate) -> ApiResult<Role> {
        let req = Self::body(RequestDescriptor::put(format!("{}/{}", ADMIN_ROLES, id)), input)?;
        self.write(req, &[keys::admin_roles(), keys::admin_role().with(id)]).await
    }

    pub async fn delete_role(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_ROLES, id));
        self.write_empty(req, &[keys::admin_roles(), keys::admin_role().with(id), keys::admin_users()]).await
    }

    // ---- users ----

    /// The signed-in user, through the session resolver's freshness window.
    pub async fn me(&self) -> Option<Principal> { self.resolver.current_principal().await }

    pub async fn update_me(&self, input: &UserUpdate) -> ApiResult<User> {
        let req = Self::body(RequestDescriptor::put(WHO_AM_I_PATH), input)?;
        let user: User = self.write(req, &[keys::admin_users(), keys::admin_user()]).await?;
        self.context.invalidate_principal();
        Ok(user)
    }

    pub async fn change_password(&self, input: &PasswordUpdate) -> ApiResult<()> {
        if input.new_password.is_empty() {
            return Err(ApiError::validation("empty_password", "new password must not be empty", 400));
        }
        let req = Self::body(RequestDescriptor::post(format!("{}/password", WHO_AM_I_PATH)), input)?;
        self.write_empty(req, &[]).await
    }

    pub async fn users(&self) -> ApiResult<Arc<Vec<User>>> {
        self.read(keys::admin_users(), RequestDescriptor::get(ADMIN_USERS)).await
    }

    pub async fn user(&self, id: i64) -> ApiResult<Arc<User>> {
        self.read(keys::admin_user().with(id), RequestDescriptor::get(format!("{}/{}", ADMIN_USERS, id))).await
    }

    pub async fn create_user(&self, input: &UserCreate) -> ApiResult<User> {
        let req = Self::body(RequestDescriptor::post(ADMIN_USERS), input)?;
        self.write(req, &[keys::admin_users()]).await
    }

    pub async fn update_user(&self, id: i64, input: &UserUpdate) -> ApiResult<User> {
        let req = Self::body(RequestDescriptor::put(format!("{}/{}", ADMIN_USERS, id)), input)?;
        let user = self.write(req, &[keys::admin_users(), keys::admin_user().with(id)]).await?;
        self.context.invalidate_principal();
        Ok(user)
    }

    pub async fn reset_user_password(&self, id: i64, new_password: &str) -> ApiResult<()> {
        let req = Self::body(RequestDescriptor::post(format!("{}/{}/password", ADMIN_USERS, id)), &serde_json::json!({ "new_password": new_password }))?;
        self.write_empty(req, &[]).await
    }

    pub async fn change_user_role(&self, id: i64, role_id: i64) -> ApiResult<User> {
        let req = Self::body(RequestDescriptor::patch(format!("{}/{}/role", ADMIN_USERS, id)), &serde_json::json!({ "role_id": role_id }))?;
        let user = self.write(req, &[keys::admin_users(), keys::admin_user().with(id)]).await?;
        self.context.invalidate_principal();
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", ADMIN_USERS, id));
        self.write_empty(req, &[keys::admin_users(), keys::admin_user().with(id), keys::tickets(), keys::ticket()]).await
    }

    // ---- tickets ----

    pub async fn tickets(&self, filter: &TicketFilter) -> ApiResult<Arc<Vec<Ticket>>> {
        let req = filter.pairs().into_iter().fold(RequestDescriptor::get(TICKETS), |r, (k, v)| r.query(k, v));
        self.read(keys::tickets_filtered(filter), req).await
    }

    pub async fn ticket(&self, id: i64) -> ApiResult<Arc<Ticket>> {
        self.read(keys::ticket_by_id(id), RequestDescriptor::get(format!("{}/{}", TICKETS, id))).await
    }

    pub async fn create_ticket(&self, input: &TicketCreate) -> ApiResult<Ticket> {
        if input.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
            return Err(ApiError::validation(
                "description_too_short".to_string(),
                format!("description must be at least {} characters", MIN_DESCRIPTION_LEN),
                422,
            ));
        }
        let req = Self::body(RequestDescriptor::post(TICKETS), input)?;
        self.write(req, &[keys::tickets()]).await
    }

    pub async fn update_ticket(&self, id: i64, input: &TicketUpdate) -> ApiResult<Ticket> {
        let req = Self::body(RequestDescriptor::patch(format!("{}/{}", TICKETS, id)), input)?;
        self.write(req, &Self::ticket_keys(id)).await
    }

    pub async fn update_ticket_status(&self, id: i64, input: &TicketStatusUpdate) -> ApiResult<Ticket> {
        let req = Self::body(RequestDescriptor::post(format!("{}/{}/status", TICKETS, id)), input)?;
        self.write(req, &Self::ticket_keys(id)).await
    }

    pub async fn delete_ticket(&self, id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}", TICKETS, id));
        self.write_empty(req, &Self::ticket_keys(id)).await
    }

    pub async fn assign_technician(&self, id: i64, technician_id: i64) -> ApiResult<Ticket> {
        let req = Self::body(RequestDescriptor::post(format!("{}/{}/assign", TICKETS, id)), &serde_json::json!({ "technician_id": technician_id }))?;
        self.write(req, &Self::ticket_keys(id)).await
    }

    pub async fn unassign_technician(&self, id: i64, technician_id: i64) -> ApiResult<Ticket> {
        let req = RequestDescriptor::delete(format!("{}/{}/unassign/{}", TICKETS, id, technician_id));
        self.write(req, &Self::ticket_keys(id)).await
    }

    pub async fn delete_ticket_file(&self, id: i64, file_id: i64) -> ApiResult<()> {
        let req = RequestDescriptor::delete(format!("{}/{}/files/{}", TICKETS, id, file_id));
        self.write_empty(req, &Self::ticket_keys(id)).await
    }

    fn ticket_keys(id: i64) -> [QueryKey; 2] { [keys::tickets(), keys::ticket_by_id(id)] }
}
