//! Typed wrappers over [`Client::request`].
//!
//! Each wrapper fixes a target, a method and a body shape; control flow is
//! exactly that of `request`. Bodies never carry client clock values, so
//! repeating a call with the same arguments yields the same
//! [`OperationKey`](crate::OperationKey) and a queued call is overwritten
//! rather than duplicated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::storage::KeyValueStore;
use crate::transport::Transport;
use crate::{CallResult, Client, RequestOptions};

pub const LOGIN: &str = "/auth/login";
pub const LOGOUT: &str = "/auth/logout";
pub const CLOCK_IN: &str = "/attendance/clock-in";
pub const CLOCK_OUT: &str = "/attendance/clock-out";
pub const BREAK_START: &str = "/attendance/break/start";
pub const BREAK_END: &str = "/attendance/break/end";
pub const LEADS: &str = "/leads";
pub const INVENTORY: &str = "/inventory";

/// A sales lead captured in the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Fields this client does not model, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stock item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn employee_body(employee_id: &str) -> Value {
    json!({ "employeeId": employee_id })
}

fn item_target(id: &str) -> String {
    format!("{INVENTORY}/{}", urlencoding::encode(id))
}

fn to_body<B: Serialize>(body: &B) -> Value {
    // Cannot fail: both body types have string keys only.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

impl<T: Transport, S: KeyValueStore> Client<T, S> {
    pub async fn login(&self, email: &str, password: &str) -> CallResult<Value> {
        let body = json!({ "email": email, "password": password });
        self.request(LOGIN, RequestOptions::post(body)).await
    }

    pub async fn logout(&self) -> CallResult<Value> {
        self.request(LOGOUT, RequestOptions::new(crate::Method::Post))
            .await
    }

    pub async fn clock_in(&self, employee_id: &str) -> CallResult<Value> {
        self.request(CLOCK_IN, RequestOptions::post(employee_body(employee_id)))
            .await
    }

    pub async fn clock_out(&self, employee_id: &str) -> CallResult<Value> {
        self.request(CLOCK_OUT, RequestOptions::post(employee_body(employee_id)))
            .await
    }

    pub async fn start_break(&self, employee_id: &str) -> CallResult<Value> {
        self.request(BREAK_START, RequestOptions::post(employee_body(employee_id)))
            .await
    }

    pub async fn end_break(&self, employee_id: &str) -> CallResult<Value> {
        self.request(BREAK_END, RequestOptions::post(employee_body(employee_id)))
            .await
    }

    /// Current attendance state of one employee.
    pub async fn attendance_status(&self, employee_id: &str) -> CallResult<Value> {
        let target = format!("/attendance/status/{}", urlencoding::encode(employee_id));
        self.request(&target, RequestOptions::get()).await
    }

    pub async fn submit_lead(&self, lead: &Lead) -> CallResult<Value> {
        self.request(LEADS, RequestOptions::post(to_body(lead)))
            .await
    }

    pub async fn list_inventory(&self) -> CallResult<Vec<InventoryItem>> {
        self.request(INVENTORY, RequestOptions::get()).await
    }

    pub async fn create_inventory_item(&self, item: &InventoryItem) -> CallResult<Value> {
        self.request(INVENTORY, RequestOptions::post(to_body(item)))
            .await
    }

    pub async fn update_inventory_item(&self, id: &str, item: &InventoryItem) -> CallResult<Value> {
        let target = item_target(id);
        self.request(&target, RequestOptions::put(to_body(item)))
            .await
    }

    pub async fn delete_inventory_item(&self, id: &str) -> CallResult<Value> {
        let target = item_target(id);
        self.request(&target, RequestOptions::delete()).await
    }
}
