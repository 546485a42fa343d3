//! TTL-bounded mailbox correlating asynchronous replies to waiting callers
//!
//! A slot is keyed by `(device_id, command_class)`, not by a unique request
//! id: the station frame format carries no id to echo, so at most one
//! outstanding request per key is supported and a second concurrent request
//! for the same key overwrites the first's slot.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rentbox_protocol::Frame;

/// Logical category of an outstanding request, one slot per device each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    Check,
    PopupSn,
    PopupIndex,
    WifiScan,
}

impl CommandClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandClass::Check => "check",
            CommandClass::PopupSn => "popup_sn",
            CommandClass::PopupIndex => "popup_index",
            CommandClass::WifiScan => "wifi_scan",
        }
    }
}

impl std::fmt::Display for CommandClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot {
    deadline: Instant,
    reply: Option<Frame>,
}

/// In-memory reply slots, one per `(device, command class)`
pub struct Mailbox {
    slots: DashMap<(String, CommandClass), Slot>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Create (or overwrite) an empty pending slot expiring after `ttl`
    pub fn open(&self, device_id: &str, class: CommandClass, ttl: Duration) {
        self.slots.insert(
            (device_id.to_string(), class),
            Slot {
                deadline: Instant::now() + ttl,
                reply: None,
            },
        );
    }

    /// Deposit a reply into an unexpired pending slot
    ///
    /// Returns false when no caller is waiting (no slot, or the slot's TTL
    /// elapsed) — the reply should then be logged and dropped, not treated
    /// as an error.
    pub fn deposit(&self, device_id: &str, class: CommandClass, reply: Frame) -> bool {
        let key = (device_id.to_string(), class);
        let expired = match self.slots.get_mut(&key) {
            Some(mut slot) => {
                if Instant::now() < slot.deadline {
                    slot.reply = Some(reply);
                    return true;
                }
                true
            }
            None => false,
        };
        if expired {
            // Dead slot: clean it up now rather than waiting for a sweep
            self.slots.remove(&key);
        }
        false
    }

    /// Take a filled reply out of the slot, clearing it
    ///
    /// Returns `None` while the slot is still pending; an expired pending
    /// slot is removed on the way out.
    pub fn take(&self, device_id: &str, class: CommandClass) -> Option<Frame> {
        let key = (device_id.to_string(), class);
        let (filled, expired) = match self.slots.get(&key) {
            Some(slot) => (slot.reply.is_some(), Instant::now() >= slot.deadline),
            None => return None,
        };

        if filled {
            return self.slots.remove(&key).and_then(|(_, slot)| slot.reply);
        }
        if expired {
            self.slots.remove(&key);
        }
        None
    }

    /// Remove a slot regardless of state (caller gave up)
    pub fn close(&self, device_id: &str, class: CommandClass) {
        self.slots.remove(&(device_id.to_string(), class));
    }

    /// Whether an unexpired slot exists for the key
    pub fn is_pending(&self, device_id: &str, class: CommandClass) -> bool {
        self.slots
            .get(&(device_id.to_string(), class))
            .map(|slot| Instant::now() < slot.deadline)
            .unwrap_or(false)
    }

    /// Drop every expired slot; abandoned calls expire here naturally
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| now < slot.deadline);
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
