use crate::*;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Version written into every stored record
pub const SCHEMA_VERSION: u32 = 1;

/// Keyed collections of persisted state
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Elections,
    Voters,
    Ballots,
    Pools,
    Entries,
    Tables,
    Board,
}

/// Ballot ids of an election's pool, in allocation order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BallotPool {
    pub election_id: Uuid,
    pub ballot_ids: Vec<BallotId>,
}

/// Anything that can be persisted
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Election(Election),
    Voter(Voter),
    Ballot(Ballot),
    Pool(BallotPool),
    Entry(BulletinEntry),
    Tables(MixnetTableSet),
    Board(BoardState),
}

impl Record {
    pub fn collection(&self) -> Collection {
        match self {
            Record::Election(_) => Collection::Elections,
            Record::Voter(_) => Collection::Voters,
            Record::Ballot(_) => Collection::Ballots,
            Record::Pool(_) => Collection::Pools,
            Record::Entry(_) => Collection::Entries,
            Record::Tables(_) => Collection::Tables,
            Record::Board(_) => Collection::Board,
        }
    }
}

/// A record together with the schema version it was written with
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredRecord {
    pub schema_version: u32,
    pub record: Record,
}

impl StoredRecord {
    pub fn new(record: Record) -> Self {
        StoredRecord {
            schema_version: SCHEMA_VERSION,
            record,
        }
    }

    pub fn into_record(self) -> Result<Record, ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::UnsupportedSchema(self.schema_version));
        }
        Ok(self.record)
    }
}

/// Store key of a ballot
pub fn ballot_key(election_id: &Uuid, ballot_id: &BallotId) -> String {
    format!("{}/{}", election_id, ballot_id)
}

/// Persisted state
///
/// Each collection is a keyed map; `put` atomically replaces one record.
pub trait Store {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>, Error>;

    fn put(&mut self, collection: Collection, key: &str, record: StoredRecord) -> Result<(), Error>;

    /// Every record of a collection, in key order
    fn list(&self, collection: Collection) -> Result<Vec<StoredRecord>, Error>;

    /// Wrap and store a record in its own collection
    fn put_record(&mut self, key: &str, record: Record) -> Result<(), Error> {
        let collection = record.collection();
        self.put(collection, key, StoredRecord::new(record))
    }

    fn get_election(&self, id: &Uuid) -> Result<Option<Election>, Error> {
        get_as(self, Collection::Elections, &id.to_string(), |r| match r {
            Record::Election(e) => Some(e),
            _ => None,
        })
    }

    fn get_ballot(&self, election_id: &Uuid, ballot_id: &BallotId) -> Result<Option<Ballot>, Error> {
        let key = ballot_key(election_id, ballot_id);
        get_as(self, Collection::Ballots, &key, |r| match r {
            Record::Ballot(b) => Some(b),
            _ => None,
        })
    }

    fn get_pool(&self, election_id: &Uuid) -> Result<Option<BallotPool>, Error> {
        get_as(self, Collection::Pools, &election_id.to_string(), |r| match r {
            Record::Pool(p) => Some(p),
            _ => None,
        })
    }

    fn get_tables(&self, election_id: &Uuid) -> Result<Option<MixnetTableSet>, Error> {
        get_as(self, Collection::Tables, &election_id.to_string(), |r| match r {
            Record::Tables(t) => Some(t),
            _ => None,
        })
    }

    fn get_board(&self, election_id: &Uuid) -> Result<Option<BoardState>, Error> {
        get_as(self, Collection::Board, &election_id.to_string(), |r| match r {
            Record::Board(b) => Some(b),
            _ => None,
        })
    }

    fn voters(&self) -> Result<Vec<Voter>, Error> {
        list_as(self, Collection::Voters, |r| match r {
            Record::Voter(v) => Some(v),
            _ => None,
        })
    }

    /// Bulletin entries in board order
    fn entries(&self) -> Result<Vec<BulletinEntry>, Error> {
        let mut entries = list_as(self, Collection::Entries, |r| match r {
            Record::Entry(e) => Some(e),
            _ => None,
        })?;
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

fn get_as<S, T, F>(store: &S, collection: Collection, key: &str, extract: F) -> Result<Option<T>, Error>
where
    S: Store + ?Sized,
    F: Fn(Record) -> Option<T>,
{
    match store.get(collection, key)? {
        Some(stored) => match extract(stored.into_record()?) {
            Some(value) => Ok(Some(value)),
            None => Err(ValidationError::UnexpectedRecord(key.to_owned()).into()),
        },
        None => Ok(None),
    }
}

fn list_as<S, T, F>(store: &S, collection: Collection, extract: F) -> Result<Vec<T>, Error>
where
    S: Store + ?Sized,
    F: Fn(Record) -> Option<T>,
{
    let mut values = vec![];
    for stored in store.list(collection)? {
        let record = stored.into_record()?;
        let collection = record.collection();
        match extract(record) {
            Some(value) => values.push(value),
            None => {
                return Err(ValidationError::UnexpectedRecord(format!("{:?}", collection)).into())
            }
        }
    }
    Ok(values)
}

/// A simple store that uses an in-memory BTreeMap
#[derive(Default, Clone, Debug)]
pub struct MemStore {
    inner: BTreeMap<(Collection, String), StoredRecord>,
}

#[derive(Serialize, Deserialize)]
struct MemStoreRow {
    collection: Collection,
    key: String,
    record: StoredRecord,
}

impl MemStore {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Delete a record. Only used to repair or inspect a store by hand.
    pub fn remove(&mut self, collection: Collection, key: &str) -> Option<StoredRecord> {
        self.inner.remove(&(collection, key.to_owned()))
    }

    /// Snapshot every record as JSON
    pub fn to_json(&self) -> Result<String, Error> {
        let rows: Vec<MemStoreRow> = self
            .inner
            .iter()
            .map(|((collection, key), record)| MemStoreRow {
                collection: *collection,
                key: key.clone(),
                record: record.clone(),
            })
            .collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let rows: Vec<MemStoreRow> = serde_json::from_str(json)?;
        let mut store = MemStore::default();
        for row in rows {
            store.inner.insert((row.collection, row.key), row.record);
        }
        Ok(store)
    }
}

impl Store for MemStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>, Error> {
        Ok(self.inner.get(&(collection, key.to_owned())).cloned())
    }

    fn put(&mut self, collection: Collection, key: &str, record: StoredRecord) -> Result<(), Error> {
        self.inner.insert((collection, key.to_owned()), record);
        Ok(())
    }

    fn list(&self, collection: Collection) -> Result<Vec<StoredRecord>, Error> {
        Ok(self
            .inner
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
