use serde_json::Value;

use crate::kecontact::client::Transport;
use crate::kecontact::gateway::Gateway;

/// Report field exposed as a named value.
#[derive(Debug, Clone)]
pub struct Sensor {
    pub name: String,
    pub unique_id: String,
    pub field: String,
    pub unit: String,
}

impl Sensor {
    pub fn new<T: Transport>(gateway: &Gateway<T>, field: &str, unit: &str) -> Self {
        Self {
            name: format!("{}_{}", gateway.name(), field),
            unique_id: format!("{}_{}", gateway.host(), field),
            field: field.to_owned(),
            unit: unit.to_owned(),
        }
    }

    /// Current value, or `None` while the gateway has no valid refresh.
    pub async fn state<T: Transport>(&self, gateway: &Gateway<T>) -> Option<Value> {
        if !gateway.is_valid().await {
            return None;
        }
        let v = gateway.lookup(&self.field).await?;
        Some(match self.field.as_str() {
            // reported in 0.1 Wh
            "E total" => v.as_f64().map(|e| Value::from(e / 10.0)).unwrap_or(v),
            _ => v,
        })
    }
}
