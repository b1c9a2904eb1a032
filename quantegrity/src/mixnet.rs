use crate::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Identifier of a ballot in the pool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BallotId(String);

impl BallotId {
    /// The n-th ballot of a pool, e.g. `ballot_000001`
    pub fn from_index(n: usize) -> Self {
        BallotId(format!("ballot_{:06}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BallotId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // '/' separates key segments in the store
        if s.is_empty() || s.contains('/') || s.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidIdentifier(s.to_owned()));
        }
        Ok(BallotId(s.to_owned()))
    }
}

/// A per-(ballot, candidate) confirmation code, shown as uppercase hex
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    pub fn from_bits(bits: &BitString) -> Self {
        ConfirmationCode(hex::encode_upper(bits.to_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConfirmationCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidIdentifier(s.to_owned()));
        }
        Ok(ConfirmationCode(s.to_ascii_uppercase()))
    }
}

/// Location of a code inside table Q
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QPointer {
    pub ballot_id: BallotId,
    pub position: usize,
}

/// Location of a tally slot inside table S
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SPointer {
    pub candidate: String,
    pub slot: usize,
}

/// One row of table R
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RRow {
    pub code: ConfirmationCode,
    pub ballot_id: BallotId,
    pub candidate: String,
    pub q_pointer: QPointer,
    pub s_pointer: SPointer,

    /// Set once the code has been revealed by a cast, spoil or audit
    pub flag: bool,
}

/// The P / Q / R / S tables of one ballot pool
///
/// - P: ballot → candidate → code
/// - Q: ballot → that ballot's codes in shuffled order
/// - R: one row per (ballot, candidate), shuffled, pointing into Q and S
/// - S: candidate → one tally slot per ballot
///
/// `flag` is the only operation that sets an S slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MixnetTableSet {
    candidates: Vec<String>,
    code_bits: usize,
    table_p: IndexMap<BallotId, IndexMap<String, ConfirmationCode>>,
    table_q: IndexMap<BallotId, Vec<ConfirmationCode>>,
    table_r: Vec<RRow>,
    table_s: IndexMap<String, Vec<bool>>,
}

impl MixnetTableSet {
    /// Generate the tables for `pool_size` ballots over `candidates`.
    ///
    /// Every code in the pool is distinct. A colliding draw is retried up to
    /// `attempts` times before the random source is reported unavailable.
    pub fn generate(
        candidates: &[String],
        pool_size: usize,
        code_bits: usize,
        attempts: usize,
        random: &mut dyn RandomSource,
        log: &mut OperationLog,
    ) -> Result<Self, Error> {
        validate_candidates(candidates)?;
        if pool_size == 0 {
            return Err(ValidationError::EmptyPool.into());
        }
        let needed = pool_size.saturating_mul(candidates.len());
        // Keep the space at most half full so collision retries stay cheap
        if code_bits < 64 && needed as u64 > (1u64 << code_bits) / 2 {
            return Err(ValidationError::CodeSpaceTooSmall {
                needed,
                bits: code_bits,
            }
            .into());
        }

        // Table P
        let mut drawn = HashSet::with_capacity(needed);
        let mut table_p = IndexMap::with_capacity(pool_size);
        for n in 1..=pool_size {
            let mut row = IndexMap::with_capacity(candidates.len());
            for candidate in candidates {
                let code = draw_code(random, code_bits, attempts, &mut drawn)?;
                row.insert(candidate.clone(), code);
            }
            table_p.insert(BallotId::from_index(n), row);
        }
        log.record(
            "generate_codes",
            None,
            format!("{} codes of {} bits", needed, code_bits),
        );

        // Table Q
        let mut table_q = IndexMap::with_capacity(pool_size);
        for (ballot_id, row) in table_p.iter() {
            let mut codes: Vec<ConfirmationCode> = row.values().cloned().collect();
            shuffle(&mut codes, random)?;
            table_q.insert(ballot_id.clone(), codes);
        }

        // Table R
        let mut table_r = Vec::with_capacity(needed);
        for (slot, (ballot_id, row)) in table_p.iter().enumerate() {
            let shuffled: &Vec<ConfirmationCode> = &table_q[ballot_id];
            for (candidate, code) in row.iter() {
                let position = shuffled.iter().position(|c| c == code).ok_or_else(|| {
                    ConsistencyViolation::MalformedTableR {
                        ballot_id: ballot_id.to_string(),
                        candidate: candidate.clone(),
                    }
                    .logged()
                })?;
                table_r.push(RRow {
                    code: code.clone(),
                    ballot_id: ballot_id.clone(),
                    candidate: candidate.clone(),
                    q_pointer: QPointer {
                        ballot_id: ballot_id.clone(),
                        position,
                    },
                    s_pointer: SPointer {
                        candidate: candidate.clone(),
                        slot,
                    },
                    flag: false,
                });
            }
        }
        shuffle(&mut table_r, random)?;

        // Table S
        let table_s = candidates
            .iter()
            .map(|c| (c.clone(), vec![false; pool_size]))
            .collect();

        let tables = MixnetTableSet {
            candidates: candidates.to_vec(),
            code_bits,
            table_p,
            table_q,
            table_r,
            table_s,
        };
        tables.verify_integrity()?;
        log.record(
            "generate_tables",
            None,
            format!("{} ballots x {} candidates", pool_size, candidates.len()),
        );
        Ok(tables)
    }

    /// Reveal a cast code and mark its tally slot.
    ///
    /// Flagging an already flagged code changes nothing and still returns its
    /// candidate: slots are set, never incremented.
    pub fn flag(&mut self, code: &ConfirmationCode) -> Result<String, Error> {
        let row = self
            .table_r
            .iter_mut()
            .find(|row| row.code == *code)
            .ok_or_else(|| ValidationError::UnknownCode(code.to_string()))?;
        row.flag = true;

        let slot = self
            .table_s
            .get_mut(&row.s_pointer.candidate)
            .and_then(|slots| slots.get_mut(row.s_pointer.slot))
            .ok_or_else(|| {
                ConsistencyViolation::MalformedTableR {
                    ballot_id: row.ballot_id.to_string(),
                    candidate: row.candidate.clone(),
                }
                .logged()
            })?;
        *slot = true;
        Ok(row.candidate.clone())
    }

    /// Reveal every code of a ballot without touching table S.
    pub fn reveal_all(
        &mut self,
        ballot_id: &BallotId,
    ) -> Result<IndexMap<String, ConfirmationCode>, Error> {
        let codes = self
            .table_p
            .get(ballot_id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownBallot(ballot_id.to_string()))?;
        for row in self.table_r.iter_mut().filter(|r| r.ballot_id == *ballot_id) {
            row.flag = true;
        }
        Ok(codes)
    }

    /// Votes per candidate, in candidate order
    pub fn tally(&self) -> IndexMap<String, usize> {
        self.table_s
            .iter()
            .map(|(candidate, slots)| (candidate.clone(), slots.iter().filter(|s| **s).count()))
            .collect()
    }

    /// Copy of these tables with every R flag and S slot reset
    pub fn cleared(&self) -> Self {
        let mut copy = self.clone();
        for row in copy.table_r.iter_mut() {
            row.flag = false;
        }
        for slots in copy.table_s.values_mut() {
            for slot in slots.iter_mut() {
                *slot = false;
            }
        }
        copy
    }

    /// Check the structural invariants linking P, Q, R and S.
    pub fn verify_integrity(&self) -> Result<(), ConsistencyViolation> {
        let malformed = |ballot_id: &BallotId, candidate: &str| {
            ConsistencyViolation::MalformedTableR {
                ballot_id: ballot_id.to_string(),
                candidate: candidate.to_owned(),
            }
            .logged()
        };

        let mut seen = HashSet::new();
        for row in self.table_p.values() {
            for code in row.values() {
                if !seen.insert(code) {
                    return Err(ConsistencyViolation::DuplicateCode(code.to_string()).logged());
                }
            }
        }

        let mut rows_per_pair: HashMap<(&BallotId, &str), usize> = HashMap::new();
        for row in self.table_r.iter() {
            *rows_per_pair
                .entry((&row.ballot_id, row.candidate.as_str()))
                .or_insert(0) += 1;

            let expected = self
                .table_p
                .get(&row.ballot_id)
                .and_then(|codes| codes.get(&row.candidate));
            let in_q = self
                .table_q
                .get(&row.q_pointer.ballot_id)
                .and_then(|codes| codes.get(row.q_pointer.position));
            let slot_exists = self
                .table_s
                .get(&row.s_pointer.candidate)
                .map_or(false, |slots| row.s_pointer.slot < slots.len());

            if expected != Some(&row.code)
                || in_q != Some(&row.code)
                || row.q_pointer.ballot_id != row.ballot_id
                || row.s_pointer.candidate != row.candidate
                || !slot_exists
            {
                return Err(malformed(&row.ballot_id, &row.candidate));
            }
        }

        for (ballot_id, codes) in self.table_p.iter() {
            let q_len = self.table_q.get(ballot_id).map_or(0, |q| q.len());
            if q_len != codes.len() {
                let candidate = codes.keys().next().map_or("", |c| c.as_str());
                return Err(malformed(ballot_id, candidate));
            }
            for candidate in codes.keys() {
                if rows_per_pair.get(&(ballot_id, candidate.as_str())) != Some(&1) {
                    return Err(malformed(ballot_id, candidate));
                }
            }
        }
        Ok(())
    }

    /// The candidate a code belongs to, from table R
    pub fn candidate_for(&self, code: &ConfirmationCode) -> Option<&str> {
        self.table_r
            .iter()
            .find(|row| row.code == *code)
            .map(|row| row.candidate.as_str())
    }

    /// The ballot a code was printed on, from table R
    pub fn ballot_for(&self, code: &ConfirmationCode) -> Option<&BallotId> {
        self.table_r
            .iter()
            .find(|row| row.code == *code)
            .map(|row| &row.ballot_id)
    }

    pub fn is_flagged(&self, code: &ConfirmationCode) -> Option<bool> {
        self.table_r
            .iter()
            .find(|row| row.code == *code)
            .map(|row| row.flag)
    }

    /// A ballot's row of table P
    pub fn codes_for(&self, ballot_id: &BallotId) -> Option<&IndexMap<String, ConfirmationCode>> {
        self.table_p.get(ballot_id)
    }

    pub fn ballot_ids(&self) -> impl Iterator<Item = &BallotId> {
        self.table_p.keys()
    }

    pub fn pool_size(&self) -> usize {
        self.table_p.len()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn code_bits(&self) -> usize {
        self.code_bits
    }

    pub fn table_p(&self) -> &IndexMap<BallotId, IndexMap<String, ConfirmationCode>> {
        &self.table_p
    }

    pub fn table_q(&self) -> &IndexMap<BallotId, Vec<ConfirmationCode>> {
        &self.table_q
    }

    pub fn table_r(&self) -> &[RRow] {
        &self.table_r
    }

    pub fn table_s(&self) -> &IndexMap<String, Vec<bool>> {
        &self.table_s
    }
}

fn draw_code(
    random: &mut dyn RandomSource,
    code_bits: usize,
    attempts: usize,
    drawn: &mut HashSet<ConfirmationCode>,
) -> Result<ConfirmationCode, Error> {
    for _ in 0..attempts {
        let code = ConfirmationCode::from_bits(&random.next_bits(code_bits)?);
        if drawn.insert(code.clone()) {
            return Ok(code);
        }
    }
    Err(Error::Unavailable(format!(
        "no unused {}-bit confirmation code after {} draws",
        code_bits, attempts
    )))
}
