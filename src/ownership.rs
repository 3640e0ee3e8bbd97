// Per-resource ownership of control requests
//
// Each resource (e.g. the drivetrain) is owned by at most one active
// request. A claim may displace the current owner only if that owner is
// interruptible and the new claim's priority is at least as high. With no
// owner, the resource's fallback request applies.

use std::collections::HashMap;
use std::hash::Hash;

/// Claim priority; higher wins
pub type Priority = u8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("Resource is owned by a request with priority {current} (interruptible: {interruptible})")]
    Busy { current: Priority, interruptible: bool },
}

#[derive(Debug)]
struct Claim<R> {
    request: R,
    priority: Priority,
    interruptible: bool,
}

#[derive(Debug)]
struct Slot<R> {
    claim: Option<Claim<R>>,
    fallback: R,
}

/// Mapping from resource to its active request, with a fallback per resource
#[derive(Debug)]
pub struct OwnerTable<K, R> {
    slots: HashMap<K, Slot<R>>,
}

impl<K: Eq + Hash, R> Default for OwnerTable<K, R> {
    fn default() -> Self {
        Self { slots: HashMap::new() }
    }
}

impl<K: Eq + Hash, R> OwnerTable<K, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource with the request used whenever nothing owns it
    ///
    /// Re-registering replaces the fallback and keeps any active claim.
    pub fn register(&mut self, key: K, fallback: R) {
        match self.slots.get_mut(&key) {
            Some(slot) => slot.fallback = fallback,
            None => {
                self.slots.insert(key, Slot { claim: None, fallback });
            }
        }
    }

    /// Try to take ownership of `key`
    ///
    /// Returns the displaced request, if any. Claiming an unregistered
    /// resource is not possible; register it first.
    pub fn claim(
        &mut self,
        key: &K,
        request: R,
        priority: Priority,
        interruptible: bool,
    ) -> Result<Option<R>, ClaimError<R>> {
        let Some(slot) = self.slots.get_mut(key) else {
            return Err(ClaimError::Unregistered(request));
        };

        if let Some(current) = &slot.claim {
            if !current.interruptible || priority < current.priority {
                return Err(ClaimError::Busy {
                    request,
                    reason: OwnershipError::Busy {
                        current: current.priority,
                        interruptible: current.interruptible,
                    },
                });
            }
        }

        let displaced = slot.claim.replace(Claim {
            request,
            priority,
            interruptible,
        });
        Ok(displaced.map(|claim| claim.request))
    }

    /// Give up ownership of `key`, returning the released request
    pub fn release(&mut self, key: &K) -> Option<R> {
        self.slots
            .get_mut(key)
            .and_then(|slot| slot.claim.take())
            .map(|claim| claim.request)
    }

    /// The request currently in charge of `key`: its owner, else its fallback
    pub fn active(&self, key: &K) -> Option<&R> {
        self.slots
            .get(key)
            .map(|slot| slot.claim.as_ref().map_or(&slot.fallback, |claim| &claim.request))
    }

    pub fn active_mut(&mut self, key: &K) -> Option<&mut R> {
        self.slots
            .get_mut(key)
            .map(|slot| match slot.claim.as_mut() {
                Some(claim) => &mut claim.request,
                None => &mut slot.fallback,
            })
    }

    pub fn is_claimed(&self, key: &K) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.claim.is_some())
    }

    pub fn priority(&self, key: &K) -> Option<Priority> {
        self.slots
            .get(key)
            .and_then(|slot| slot.claim.as_ref())
            .map(|claim| claim.priority)
    }
}

/// A rejected claim; the request is handed back to the caller
#[derive(Debug, thiserror::Error)]
pub enum ClaimError<R> {
    #[error("Resource is not registered")]
    Unregistered(R),
    #[error("{reason}")]
    Busy { request: R, reason: OwnershipError },
}

impl<R> ClaimError<R> {
    pub fn into_request(self) -> R {
        match self {
            ClaimError::Unregistered(request) | ClaimError::Busy { request, .. } => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Resource {
        Drive,
        Turret,
    }

    fn table() -> OwnerTable<Resource, &'static str> {
        let mut table = OwnerTable::new();
        table.register(Resource::Drive, "teleop");
        table
    }

    #[test]
    fn test_fallback_when_unclaimed() {
        let table = table();
        assert_eq!(table.active(&Resource::Drive), Some(&"teleop"));
        assert!(!table.is_claimed(&Resource::Drive));
        assert_eq!(table.active(&Resource::Turret), None);
    }

    #[test]
    fn test_claim_and_release() {
        let mut table = table();
        let displaced = table.claim(&Resource::Drive, "auto", 10, true).unwrap();
        assert_eq!(displaced, None);
        assert_eq!(table.active(&Resource::Drive), Some(&"auto"));
        assert_eq!(table.priority(&Resource::Drive), Some(10));

        assert_eq!(table.release(&Resource::Drive), Some("auto"));
        assert_eq!(table.active(&Resource::Drive), Some(&"teleop"));
        assert_eq!(table.release(&Resource::Drive), None);
    }

    #[test]
    fn test_higher_priority_interrupts() {
        let mut table = table();
        table.claim(&Resource::Drive, "auto", 10, true).unwrap();
        let displaced = table.claim(&Resource::Drive, "align", 20, true).unwrap();
        assert_eq!(displaced, Some("auto"));
        assert_eq!(table.active(&Resource::Drive), Some(&"align"));
    }

    #[test]
    fn test_lower_priority_rejected() {
        let mut table = table();
        table.claim(&Resource::Drive, "align", 20, true).unwrap();
        let err = table.claim(&Resource::Drive, "auto", 10, true).unwrap_err();
        assert!(matches!(err, ClaimError::Busy { .. }));
        assert_eq!(err.into_request(), "auto");
        assert_eq!(table.active(&Resource::Drive), Some(&"align"));
    }

    #[test]
    fn test_uninterruptible_owner_keeps_resource() {
        let mut table = table();
        table.claim(&Resource::Drive, "climb", 5, false).unwrap();
        let err = table.claim(&Resource::Drive, "auto", 100, true).unwrap_err();
        match err {
            ClaimError::Busy { reason, .. } => assert_eq!(
                reason,
                OwnershipError::Busy {
                    current: 5,
                    interruptible: false
                }
            ),
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn test_unregistered_claim_rejected() {
        let mut table = table();
        let err = table.claim(&Resource::Turret, "aim", 1, true).unwrap_err();
        assert!(matches!(err, ClaimError::Unregistered("aim")));
    }

    #[test]
    fn test_claim_error_is_std_error() {
        let mut table = table();
        table.claim(&Resource::Drive, "climb", 5, false).unwrap();
        let err = table.claim(&Resource::Drive, "auto", 100, true).unwrap_err();
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(
            boxed.to_string(),
            "Resource is owned by a request with priority 5 (interruptible: false)"
        );
    }
}
