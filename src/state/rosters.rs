//! Live room rosters.
//!
//! A roster is the set of connections currently joined to a group's
//! room. It is distinct from persisted membership: a member who is
//! offline has a row but no roster entry, and every roster entry is
//! dropped when its transport dies.

use super::registry::ConnId;
use dashmap::DashMap;
use salon_proto::GroupId;
use std::collections::HashSet;

/// Connection membership of every live room.
#[derive(Default)]
pub struct RoomRosters {
    rooms: DashMap<GroupId, HashSet<ConnId>>,
    // Reverse index so transport death can clean up without scanning.
    joined: DashMap<ConnId, HashSet<GroupId>>,
}

impl RoomRosters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Idempotent; returns whether the
    /// entry is new.
    pub fn join(&self, group_id: &GroupId, conn_id: ConnId) -> bool {
        let newly = self.rooms.entry(group_id.clone()).or_default().insert(conn_id);
        self.joined.entry(conn_id).or_default().insert(group_id.clone());
        newly
    }

    /// Remove a connection from a room. Returns whether it was joined.
    pub fn leave(&self, group_id: &GroupId, conn_id: ConnId) -> bool {
        let was_joined = self
            .rooms
            .get_mut(group_id)
            .map(|mut set| set.remove(&conn_id))
            .unwrap_or(false);
        self.rooms.remove_if(group_id, |_, set| set.is_empty());
        if let Some(mut set) = self.joined.get_mut(&conn_id) {
            set.remove(group_id);
        }
        self.joined.remove_if(&conn_id, |_, set| set.is_empty());
        was_joined
    }

    /// Whether a connection is joined to a room.
    pub fn is_joined(&self, group_id: &GroupId, conn_id: ConnId) -> bool {
        self.rooms.get(group_id).is_some_and(|set| set.contains(&conn_id))
    }

    /// Every connection in a room.
    pub fn conns_in(&self, group_id: &GroupId) -> Vec<ConnId> {
        self.rooms
            .get(group_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every roster entry a dying connection holds, returning the
    /// rooms it was joined to.
    pub fn drop_conn(&self, conn_id: ConnId) -> Vec<GroupId> {
        let Some((_, groups)) = self.joined.remove(&conn_id) else {
            return Vec::new();
        };
        for group_id in &groups {
            if let Some(mut set) = self.rooms.get_mut(group_id) {
                set.remove(&conn_id);
            }
            self.rooms.remove_if(group_id, |_, set| set.is_empty());
        }
        groups.into_iter().collect()
    }

    /// Drop a whole room, returning the evicted connections.
    pub fn drop_room(&self, group_id: &GroupId) -> Vec<ConnId> {
        let Some((_, conns)) = self.rooms.remove(group_id) else {
            return Vec::new();
        };
        for conn_id in &conns {
            if let Some(mut set) = self.joined.get_mut(conn_id) {
                set.remove(group_id);
            }
            self.joined.remove_if(conn_id, |_, set| set.is_empty());
        }
        conns.into_iter().collect()
    }
}
