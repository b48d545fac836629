// src/db/transaction.rs
use std::collections::BTreeMap;

use super::{ChangeEvent, ChangeKind, Collection, Collections};
use crate::models::{FileRecord, Invitation, Team, User};

// Writes staged against one collection. `None` marks a delete.
pub(crate) struct Staged<T> {
    writes: BTreeMap<String, Option<T>>,
}

impl<T> Staged<T> {
    fn new() -> Self {
        Self {
            writes: BTreeMap::new(),
        }
    }

    fn get<'a>(&'a self, base: &'a BTreeMap<String, T>, id: &str) -> Option<&'a T> {
        match self.writes.get(id) {
            Some(staged) => staged.as_ref(),
            None => base.get(id),
        }
    }

    fn iter<'a>(&'a self, base: &'a BTreeMap<String, T>) -> impl Iterator<Item = &'a T> + 'a {
        base.iter()
            .filter(move |(id, _)| !self.writes.contains_key(*id))
            .map(|(_, value)| value)
            .chain(self.writes.values().filter_map(Option::as_ref))
    }

    fn put(&mut self, id: String, value: T) {
        self.writes.insert(id, Some(value));
    }

    fn delete(&mut self, id: &str) {
        self.writes.insert(id.to_string(), None);
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    // Applies the staged writes and returns what they replaced
    fn apply(
        self,
        target: &mut BTreeMap<String, T>,
        collection: Collection,
        events: &mut Vec<ChangeEvent>,
    ) -> Vec<(String, Option<T>)> {
        let mut undo = Vec::with_capacity(self.writes.len());

        for (id, value) in self.writes {
            let upserted = value.is_some();
            let previous = match value {
                Some(value) => target.insert(id.clone(), value),
                None => target.remove(&id),
            };

            if upserted || previous.is_some() {
                events.push(ChangeEvent {
                    collection,
                    id: id.clone(),
                    kind: if upserted {
                        ChangeKind::Upserted
                    } else {
                        ChangeKind::Deleted
                    },
                });
            }
            undo.push((id, previous));
        }

        undo
    }
}

fn restore<T>(target: &mut BTreeMap<String, T>, undo: Vec<(String, Option<T>)>) {
    for (id, previous) in undo.into_iter().rev() {
        match previous {
            Some(value) => {
                target.insert(id, value);
            }
            None => {
                target.remove(&id);
            }
        }
    }
}

/// A read-modify-write unit of work.
///
/// Reads see the committed state overlaid with this transaction's own staged
/// writes. Nothing reaches the shared collections until the closure passed to
/// [`Database::transaction`](super::Database::transaction) returns `Ok`.
pub struct Transaction<'a> {
    base: &'a Collections,
    users: Staged<User>,
    teams: Staged<Team>,
    files: Staged<FileRecord>,
    invitations: Staged<Invitation>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a Collections) -> Self {
        Self {
            base,
            users: Staged::new(),
            teams: Staged::new(),
            files: Staged::new(),
            invitations: Staged::new(),
        }
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(&self.base.users, id)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> + '_ {
        self.users.iter(&self.base.users)
    }

    pub fn put_user(&mut self, user: User) {
        self.users.put(user.id.clone(), user);
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.get(&self.base.teams, id)
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> + '_ {
        self.teams.iter(&self.base.teams)
    }

    pub fn put_team(&mut self, team: Team) {
        self.teams.put(team.id.clone(), team);
    }

    pub fn file(&self, id: &str) -> Option<&FileRecord> {
        self.files.get(&self.base.files, id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> + '_ {
        self.files.iter(&self.base.files)
    }

    pub fn put_file(&mut self, file: FileRecord) {
        self.files.put(file.id.clone(), file);
    }

    pub fn delete_file(&mut self, id: &str) {
        self.files.delete(id);
    }

    pub fn invitation(&self, id: &str) -> Option<&Invitation> {
        self.invitations.get(&self.base.invitations, id)
    }

    pub fn invitations(&self) -> impl Iterator<Item = &Invitation> + '_ {
        self.invitations.iter(&self.base.invitations)
    }

    pub fn put_invitation(&mut self, invitation: Invitation) {
        self.invitations.put(invitation.id.clone(), invitation);
    }

    pub(crate) fn into_writes(self) -> WriteSet {
        WriteSet {
            users: self.users,
            teams: self.teams,
            files: self.files,
            invitations: self.invitations,
        }
    }
}

// Everything a transaction staged, detached from the borrow of the base state
pub(crate) struct WriteSet {
    users: Staged<User>,
    teams: Staged<Team>,
    files: Staged<FileRecord>,
    invitations: Staged<Invitation>,
}

pub(crate) struct UndoLog {
    users: Vec<(String, Option<User>)>,
    teams: Vec<(String, Option<Team>)>,
    files: Vec<(String, Option<FileRecord>)>,
    invitations: Vec<(String, Option<Invitation>)>,
}

impl WriteSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.teams.is_empty()
            && self.files.is_empty()
            && self.invitations.is_empty()
    }

    pub(crate) fn apply(self, state: &mut Collections) -> (UndoLog, Vec<ChangeEvent>) {
        let mut events = Vec::new();
        let undo = UndoLog {
            users: self.users.apply(&mut state.users, Collection::Users, &mut events),
            teams: self.teams.apply(&mut state.teams, Collection::Teams, &mut events),
            files: self.files.apply(&mut state.files, Collection::Files, &mut events),
            invitations: self.invitations.apply(
                &mut state.invitations,
                Collection::Invitations,
                &mut events,
            ),
        };
        (undo, events)
    }
}

impl UndoLog {
    pub(crate) fn restore(self, state: &mut Collections) {
        restore(&mut state.users, self.users);
        restore(&mut state.teams, self.teams);
        restore(&mut state.files, self.files);
        restore(&mut state.invitations, self.invitations);
    }
}
