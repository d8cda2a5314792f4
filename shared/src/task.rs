//! Task and task-event records and the state machine both the manager and
//! the worker enforce over them.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a task. Wire-encoded as an integer 0-4, not a string
/// tag, to match the external interface's numeric state contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    fn as_u8(self) -> u8 {
        match self {
            State::Pending => 0,
            State::Scheduled => 1,
            State::Running => 2,
            State::Completed => 3,
            State::Failed => 4,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(State::Pending),
            1 => Some(State::Scheduled),
            2 => Some(State::Running),
            3 => Some(State::Completed),
            4 => Some(State::Failed),
            _ => None,
        }
    }

    /// Whether `self -> next` is a permitted transition per the control-plane
    /// state machine. Self-loops are permitted on Scheduled and Running to
    /// allow reassertion of an in-flight state.
    pub fn can_transition_to(self, next: State) -> bool {
        use State::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Scheduled, Running)
                | (Scheduled, Failed)
                | (Scheduled, Scheduled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Running)
        )
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        State::from_u8(value).ok_or_else(|| de::Error::custom(format!("invalid state: {value}")))
    }
}

/// A restart policy string carried on the task record. Interpreted by the
/// manager's health-check/restart logic; the worker treats it as opaque.
pub type RestartPolicy = String;

/// One unit of containerised work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub state: State,
    pub image: String,
    /// Memory request in bytes.
    pub memory: u64,
    /// Disk request in bytes.
    pub disk: u64,
    /// CPU request in fractional cores.
    pub cpu: f64,
    /// Exposed container ports, keyed by `"<port>/<proto>"` (e.g. `"80/tcp"`).
    #[serde(default)]
    pub exposed_ports: HashMap<String, String>,
    /// Host ports observed once the container is running, keyed the same way.
    #[serde(default)]
    pub host_ports: HashMap<String, String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    /// HTTP path probed by the manager's health-check loop.
    #[serde(default)]
    pub health_check: String,
    /// Container identifier assigned by the runtime once started.
    #[serde(default)]
    pub container_id: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: State::Pending,
            image: image.into(),
            memory: 0,
            disk: 0,
            cpu: 0.0,
            exposed_ports: HashMap::new(),
            host_ports: HashMap::new(),
            restart_policy: String::new(),
            restart_count: 0,
            start_time: None,
            finish_time: None,
            health_check: String::new(),
            container_id: None,
        }
    }
}

/// A timestamped statement of intent to move a task toward a target state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaskEvent {
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_are_accepted() {
        assert!(State::Pending.can_transition_to(State::Scheduled));
        assert!(State::Scheduled.can_transition_to(State::Running));
        assert!(State::Scheduled.can_transition_to(State::Failed));
        assert!(State::Running.can_transition_to(State::Completed));
        assert!(State::Running.can_transition_to(State::Failed));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!State::Pending.can_transition_to(State::Running));
        assert!(!State::Completed.can_transition_to(State::Running));
        assert!(!State::Failed.can_transition_to(State::Scheduled));
        assert!(!State::Running.can_transition_to(State::Pending));
    }

    #[test]
    fn state_wire_form_is_numeric() {
        let json = serde_json::to_string(&State::Running).unwrap();
        assert_eq!(json, "2");
        let decoded: State = serde_json::from_str("3").unwrap();
        assert_eq!(decoded, State::Completed);
    }

    #[test]
    fn task_event_rejects_unknown_fields() {
        let task = Task::new("web", "nginx:latest");
        let event = TaskEvent::new(State::Scheduled, task);
        let mut value = serde_json::to_value(&event).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("bogus".to_string(), serde_json::json!(true));
        let err = serde_json::from_value::<TaskEvent>(value).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
