//! `users.txt`: the virtual filesystem's own plaintext user/group database,
//! stored as a regular file at `/users.txt` (inode 1). This is deliberately
//! not the host's real `/etc/passwd`/shadow — passwords are compared as
//! plain strings, matching the spec this crate implements rather than real
//! OS user management.

use crate::error::{Error, Result};

pub const SEED_USERS_FILE: &str = "1,G,root\n1,U,root,root,123\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Group { id: i64, name: String },
    User {
        id: i64,
        group: String,
        name: String,
        password: String,
    },
}

impl Record {
    pub fn id(&self) -> i64 {
        match self {
            Record::Group { id, .. } => *id,
            Record::User { id, .. } => *id,
        }
    }

    fn is_tombstone(&self) -> bool {
        self.id() == 0
    }
}

/// Parses the full contents of `users.txt`. Blank lines are skipped.
pub fn parse(content: &str) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        match fields.as_slice() {
            [id, "G", name] => {
                let id = id
                    .parse()
                    .map_err(|_| Error::integrity(format!("bad users.txt id: {id}")))?;
                out.push(Record::Group {
                    id,
                    name: name.to_string(),
                });
            }
            [id, "U", group, name, password] => {
                let id = id
                    .parse()
                    .map_err(|_| Error::integrity(format!("bad users.txt id: {id}")))?;
                out.push(Record::User {
                    id,
                    group: group.to_string(),
                    name: name.to_string(),
                    password: password.to_string(),
                });
            }
            _ => return Err(Error::integrity(format!("malformed users.txt line: {line}"))),
        }
    }
    Ok(out)
}

pub fn serialize(records: &[Record]) -> String {
    let mut out = String::new();
    for r in records {
        match r {
            Record::Group { id, name } => out.push_str(&format!("{id},G,{name}\n")),
            Record::User {
                id,
                group,
                name,
                password,
            } => out.push_str(&format!("{id},U,{group},{name},{password}\n")),
        }
    }
    out
}

fn next_id(records: &[Record]) -> i64 {
    records.iter().map(|r| r.id()).max().unwrap_or(0) + 1
}

pub fn find_group<'a>(records: &'a [Record], name: &str) -> Option<&'a Record> {
    records.iter().find(|r| {
        !r.is_tombstone()
            && matches!(r, Record::Group { name: n, .. } if n == name)
    })
}

pub fn find_user<'a>(records: &'a [Record], name: &str) -> Option<&'a Record> {
    records.iter().find(|r| {
        !r.is_tombstone()
            && matches!(r, Record::User { name: n, .. } if n == name)
    })
}

pub fn add_group(records: &mut Vec<Record>, name: &str) -> Result<i64> {
    if find_group(records, name).is_some() {
        return Err(Error::conflict(format!("group {name} already exists")));
    }
    let id = next_id(records);
    records.push(Record::Group {
        id,
        name: name.to_string(),
    });
    Ok(id)
}

pub fn remove_group(records: &mut [Record], name: &str) -> Result<()> {
    let slot = records
        .iter_mut()
        .find(|r| !r.is_tombstone() && matches!(r, Record::Group { name: n, .. } if n == name))
        .ok_or_else(|| Error::not_found(format!("group {name} not found")))?;
    *slot = Record::Group {
        id: 0,
        name: String::new(),
    };
    Ok(())
}

pub fn add_user(
    records: &mut Vec<Record>,
    group: &str,
    name: &str,
    password: &str,
) -> Result<i64> {
    if find_group(records, group).is_none() {
        return Err(Error::not_found(format!("group {group} not found")));
    }
    if find_user(records, name).is_some() {
        return Err(Error::conflict(format!("user {name} already exists")));
    }
    let id = next_id(records);
    records.push(Record::User {
        id,
        group: group.to_string(),
        name: name.to_string(),
        password: password.to_string(),
    });
    Ok(id)
}

pub fn remove_user(records: &mut [Record], name: &str) -> Result<()> {
    let slot = records
        .iter_mut()
        .find(|r| !r.is_tombstone() && matches!(r, Record::User { name: n, .. } if n == name))
        .ok_or_else(|| Error::not_found(format!("user {name} not found")))?;
    *slot = Record::User {
        id: 0,
        group: String::new(),
        name: String::new(),
        password: String::new(),
    };
    Ok(())
}

pub fn change_group(records: &mut [Record], user: &str, new_group: &str) -> Result<()> {
    if find_group(records, new_group).is_none() {
        return Err(Error::not_found(format!("group {new_group} not found")));
    }
    let slot = records
        .iter_mut()
        .find(|r| !r.is_tombstone() && matches!(r, Record::User { name: n, .. } if n == user))
        .ok_or_else(|| Error::not_found(format!("user {user} not found")))?;
    if let Record::User { group, .. } = slot {
        *group = new_group.to_string();
    }
    Ok(())
}

/// Plain string comparison, matching this crate's virtual `users.txt`
/// semantics rather than a hashed real-OS login.
pub fn authenticate<'a>(records: &'a [Record], user: &str, password: &str) -> Option<&'a Record> {
    records.iter().find(|r| {
        !r.is_tombstone()
            && matches!(r, Record::User { name, password: p, .. } if name == user && p == password)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seed_parses() {
        let records = parse(SEED_USERS_FILE).unwrap();
        assert_eq!(records.len(), 2);
        assert!(find_group(&records, "root").is_some());
        assert!(authenticate(&records, "root", "123").is_some());
        assert!(authenticate(&records, "root", "wrong").is_none());
    }

    #[test]
    fn roundtrip_serialize() {
        let records = parse(SEED_USERS_FILE).unwrap();
        let text = serialize(&records);
        let reparsed = parse(&text).unwrap();
        assert_eq!(records, reparsed);
    }

    #[test]
    fn add_and_remove_user() {
        let mut records = parse(SEED_USERS_FILE).unwrap();
        add_user(&mut records, "root", "alice", "hunter2").unwrap();
        assert!(authenticate(&records, "alice", "hunter2").is_some());
        remove_user(&mut records, "alice").unwrap();
        assert!(authenticate(&records, "alice", "hunter2").is_none());
    }

    #[test]
    fn duplicate_group_is_conflict() {
        let mut records = parse(SEED_USERS_FILE).unwrap();
        let err = add_group(&mut records, "root").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
