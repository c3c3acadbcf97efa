use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::uid::Uid;

pub trait Reach {
    fn is_live(&self, uid: Uid) -> bool;
    fn can_reach(&self, observer: Uid, container: Uid) -> bool;
}

/// Notice for the network layer that an observer's view of a container was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerClosed {
    pub observer: Uid,
    pub container: Uid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VisibilityError {
    #[error("observer {uid} is deleted")]
    DeletedObserver { uid: Uid },
    #[error("container {uid} is deleted")]
    DeletedContainer { uid: Uid },
}

/// Which observers have which containers open. Both maps always describe the same pairs.
#[derive(Debug, Default)]
pub struct OpenedContainers {
    by_observer: HashMap<Uid, HashSet<Uid>>,
    by_container: HashMap<Uid, Vec<Uid>>,
    closed: Vec<ContainerClosed>,
}

impl OpenedContainers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_container_opened(&mut self, observer: Uid, container: Uid) {
        if self.by_observer.entry(observer).or_default().insert(container) {
            self.by_container.entry(container).or_default().push(observer);
        }
    }

    pub fn set_container_closed(&mut self, observer: Uid, container: Uid) -> bool {
        let removed = self.unlink(observer, container);
        if removed {
            self.closed.push(ContainerClosed {
                observer,
                container,
            });
        }
        removed
    }

    /// Closes `container` for every viewer. Returns how many views were closed.
    pub fn close_container_for_all(&mut self, container: Uid) -> usize {
        let Some(viewers) = self.by_container.remove(&container) else {
            return 0;
        };
        for observer in &viewers {
            self.remove_from_observer(*observer, container);
            self.closed.push(ContainerClosed {
                observer: *observer,
                container,
            });
        }
        viewers.len()
    }

    pub fn close_all_for_observer(&mut self, observer: Uid) -> usize {
        let Some(containers) = self.by_observer.remove(&observer) else {
            return 0;
        };
        for container in &containers {
            self.remove_from_container(*container, observer);
            self.closed.push(ContainerClosed {
                observer,
                container: *container,
            });
        }
        containers.len()
    }

    /// Drops every entry mentioning `uid`. Viewers of `uid` get close notices; `uid` itself
    /// does not, since it is going away.
    pub fn forget(&mut self, uid: Uid) {
        self.close_container_for_all(uid);
        if let Some(containers) = self.by_observer.remove(&uid) {
            for container in containers {
                self.remove_from_container(container, uid);
            }
        }
    }

    /// A failed reach check closes the view as a side effect.
    pub fn has_container_open(
        &mut self,
        reach: &dyn Reach,
        observer: Uid,
        container: Uid,
    ) -> Result<bool, VisibilityError> {
        ensure_live(reach, observer, container)?;
        if !self.is_open(observer, container) {
            return Ok(false);
        }
        if reach.can_reach(observer, container) {
            return Ok(true);
        }
        debug!(observer = %observer, container = %container, "container_view_out_of_reach");
        self.set_container_closed(observer, container);
        Ok(false)
    }

    /// Open containers of `observer` that are still reachable, sorted by uid.
    pub fn opened_containers(
        &mut self,
        reach: &dyn Reach,
        observer: Uid,
    ) -> Result<Vec<Uid>, VisibilityError> {
        if !reach.is_live(observer) {
            return Err(VisibilityError::DeletedObserver { uid: observer });
        }
        let mut candidates = self
            .by_observer
            .get(&observer)
            .map(|set| set.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        candidates.sort();
        let mut surviving = Vec::with_capacity(candidates.len());
        for container in candidates {
            if reach.is_live(container) && reach.can_reach(observer, container) {
                surviving.push(container);
            } else {
                self.set_container_closed(observer, container);
            }
        }
        Ok(surviving)
    }

    /// Observers of `container` that can still reach it, in opening order.
    pub fn viewers(&mut self, reach: &dyn Reach, container: Uid) -> Result<Vec<Uid>, VisibilityError> {
        if !reach.is_live(container) {
            return Err(VisibilityError::DeletedContainer { uid: container });
        }
        let candidates = self.by_container.get(&container).cloned().unwrap_or_default();
        let mut surviving = Vec::with_capacity(candidates.len());
        for observer in candidates {
            if reach.is_live(observer) && reach.can_reach(observer, container) {
                surviving.push(observer);
            } else {
                self.set_container_closed(observer, container);
            }
        }
        Ok(surviving)
    }

    /// Registry lookup only; no reach check and no side effects.
    pub fn is_open(&self, observer: Uid, container: Uid) -> bool {
        self.by_observer
            .get(&observer)
            .is_some_and(|set| set.contains(&container))
    }

    pub fn open_count(&self) -> usize {
        self.by_observer.values().map(HashSet::len).sum()
    }

    pub fn take_closed(&mut self) -> Vec<ContainerClosed> {
        std::mem::take(&mut self.closed)
    }

    /// Rewrites uids after compaction.
    pub fn remap(&mut self, map: impl Fn(Uid) -> Uid) {
        self.by_observer = std::mem::take(&mut self.by_observer)
            .into_iter()
            .map(|(observer, set)| (map(observer), set.into_iter().map(&map).collect()))
            .collect();
        self.by_container = std::mem::take(&mut self.by_container)
            .into_iter()
            .map(|(container, list)| (map(container), list.into_iter().map(&map).collect()))
            .collect();
    }

    fn unlink(&mut self, observer: Uid, container: Uid) -> bool {
        if !self.remove_from_observer(observer, container) {
            return false;
        }
        self.remove_from_container(container, observer);
        true
    }

    fn remove_from_observer(&mut self, observer: Uid, container: Uid) -> bool {
        let Some(set) = self.by_observer.get_mut(&observer) else {
            return false;
        };
        let removed = set.remove(&container);
        if set.is_empty() {
            self.by_observer.remove(&observer);
        }
        removed
    }

    fn remove_from_container(&mut self, container: Uid, observer: Uid) {
        if let Some(list) = self.by_container.get_mut(&container) {
            list.retain(|viewer| *viewer != observer);
            if list.is_empty() {
                self.by_container.remove(&container);
            }
        }
    }
}

fn ensure_live(reach: &dyn Reach, observer: Uid, container: Uid) -> Result<(), VisibilityError> {
    if !reach.is_live(observer) {
        return Err(VisibilityError::DeletedObserver { uid: observer });
    }
    if !reach.is_live(container) {
        return Err(VisibilityError::DeletedContainer { uid: container });
    }
    Ok(())
}
