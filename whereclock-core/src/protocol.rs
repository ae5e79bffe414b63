//! Messages exchanged between the foreground session and the background
//! worker, and the notification the worker raises on zone entry.
//!
//! Only two message shapes cross the boundary, both bare type tags:
//! `{"type":"show-alarm"}` and `{"type":"stop-alarm"}`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// De-duplication tag: re-raising with the same tag replaces the visible
/// notification instead of stacking a second one.
pub const ALARM_NOTIFICATION_TAG: &str = "alarma-ubicacion";

/// Action identifier of the notification's "stop" button.
pub const STOP_ACTION: &str = "detener";

pub const ALARM_TITLE: &str = "¡ESTÁS DENTRO DEL ÁREA PREESTABLECIDA!";
pub const ALARM_BODY: &str = "WHERECLOCK detectó que entraste en la zona definida.";
pub const ALARM_ICON: &str = "/iconos/icono-192.png";

/// Vibration pattern in milliseconds (on, off, on).
pub const ALARM_VIBRATE: [u32; 3] = [300, 100, 300];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeMessage {
    /// Foreground → background: raise the alarm notification
    ShowAlarm,
    /// Background → foreground: silence and disable the alarm
    StopAlarm,
}

impl BridgeMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a message; unknown types yield `None` and are dropped by the
    /// receiver.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// A named button on a system notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Everything the notification surface needs to display the alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    pub renotify: bool,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

impl NotificationRequest {
    /// The zone-entry alarm notification.
    pub fn alarm() -> Self {
        Self {
            title: ALARM_TITLE.to_string(),
            body: ALARM_BODY.to_string(),
            icon: ALARM_ICON.to_string(),
            tag: ALARM_NOTIFICATION_TAG.to_string(),
            renotify: true,
            vibrate: ALARM_VIBRATE.to_vec(),
            actions: vec![NotificationAction {
                action: STOP_ACTION.to_string(),
                title: "🛑 Detener alarma".to_string(),
            }],
        }
    }
}

/// What the user did with a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationInteraction {
    /// A named action button was pressed
    Action(String),
    /// The notification body was clicked
    Click,
}

impl NotificationInteraction {
    pub fn is_stop(&self) -> bool {
        matches!(self, NotificationInteraction::Action(a) if a == STOP_ACTION)
    }
}
