use std::io::{Read, Write};

use crate::codec::{DatabaseError, read_database, write_database};
use crate::signature::Database;

/// Unions databases class by class.
///
/// A class found in several inputs gets the union of their member
/// signatures; its superclass and interfaces come from the first input
/// that has it.
pub fn merge<I>(databases: I) -> Database
where
    I: IntoIterator<Item = Database>,
{
    let mut merged = Database::new();
    for db in databases {
        for set in db {
            match merged.get_mut(&set.name) {
                Some(existing) => existing.members.extend(set.members),
                None => {
                    merged.insert(set);
                }
            }
        }
    }
    merged
}

/// Reads every input stream, merges them and writes the result.
pub fn merge_streams<I, R, W>(readers: I, writer: W) -> Result<Database, DatabaseError>
where
    I: IntoIterator<Item = R>,
    R: Read,
    W: Write,
{
    let databases = readers
        .into_iter()
        .map(read_database)
        .collect::<Result<Vec<_>, _>>()?;
    let merged = merge(databases);
    write_database(writer, &merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureSet;

    fn db(sets: Vec<SignatureSet>) -> Database {
        sets.into_iter().collect()
    }

    #[test]
    fn shared_classes_get_member_union() {
        let a = db(vec![SignatureSet::new("Z", None, Vec::new()).with_members(["a()V"])]);
        let b = db(vec![SignatureSet::new("Z", None, Vec::new()).with_members(["b()V"])]);
        let merged = merge([a, b]);
        let z = merged.get("Z").unwrap();
        assert!(z.contains("a()V") && z.contains("b()V"));
        assert_eq!(z.members.len(), 2);
    }

    #[test]
    fn disjoint_classes_are_copied() {
        let a = db(vec![SignatureSet::new("A", None, Vec::new())]);
        let b = db(vec![SignatureSet::new("B", None, Vec::new())]);
        let merged = merge([a, b]);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains("A") && merged.contains("B"));
    }

    #[test]
    fn first_input_decides_hierarchy() {
        let first = db(vec![SignatureSet::new(
            "C",
            Some("java/lang/Object".to_string()),
            vec!["java/io/Serializable".to_string()],
        )]);
        let second = db(vec![SignatureSet::new(
            "C",
            Some("p/Base".to_string()),
            Vec::new(),
        )]);
        let merged = merge([first, second]);
        let c = merged.get("C").unwrap();
        assert_eq!(c.superclass.as_deref(), Some("java/lang/Object"));
        assert_eq!(c.interfaces, vec!["java/io/Serializable".to_string()]);
    }

    #[test]
    fn merge_streams_round_trips_through_the_codec() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_database(&mut a, &db(vec![SignatureSet::new("Z", None, Vec::new()).with_members(["x#I"])]))
            .unwrap();
        write_database(&mut b, &db(vec![SignatureSet::new("Z", None, Vec::new()).with_members(["y#I"])]))
            .unwrap();

        let mut out = Vec::new();
        let merged = merge_streams([a.as_slice(), b.as_slice()], &mut out).unwrap();
        assert_eq!(read_database(out.as_slice()).unwrap(), merged);
        assert_eq!(merged.get("Z").unwrap().members.len(), 2);
    }
}
