use std::path::Path;

use cion_pki::{Trc, TrcId, chain_id};
use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::{Chain, ChainQuery, TrustDb, TrustDbError};

const TRCS_TREE: &str = "trcs";
const CHAINS_TREE: &str = "chains";

/// Separator between the IA string and the subject key identifier in chain
/// keys. IA strings never contain a NUL byte.
const KEY_SEPARATOR: u8 = 0;

/// Trust database backed by an embedded sled key-value store.
///
/// TRC keys are the big-endian composite `ISD || Base || Serial`, so a
/// prefix scan over an ISD yields its TRCs in version order. Chain keys are
/// `IA || 0x00 || SubjectKeyId || chain-hash`, so chains sharing a subject
/// key identifier prefix sort together under their IA.
pub struct SledTrustDb {
    db: sled::Db,
    trcs: sled::Tree,
    chains: sled::Tree,
}

impl SledTrustDb {
    pub fn open(path: &Path) -> Result<SledTrustDb, TrustDbError> {
        let db = sled::open(path)?;
        let trcs = db.open_tree(TRCS_TREE)?;
        let chains = db.open_tree(CHAINS_TREE)?;
        Ok(SledTrustDb { db, trcs, chains })
    }

    fn collect_match(
        &self,
        value: &[u8],
        query: &ChainQuery,
        out: &mut Vec<Chain>,
    ) -> Result<(), TrustDbError> {
        let chain = split_chain(value)?;
        let info = chain.as_cert_info()?;
        if query.matches_validity(&info) {
            out.push(chain);
        }
        Ok(())
    }
}

impl TrustDb for SledTrustDb {
    fn chains(&self, query: &ChainQuery) -> Result<Vec<Chain>, TrustDbError> {
        let mut out = Vec::new();
        if query.ia.is_wildcard() {
            for entry in self.chains.iter() {
                let (key, value) = entry?;
                let Some(sep) = key.iter().position(|b| *b == KEY_SEPARATOR) else {
                    continue;
                };
                if !key[sep + 1..].starts_with(&query.subject_key_id) {
                    continue;
                }
                self.collect_match(&value, query, &mut out)?;
            }
            return Ok(out);
        }
        let mut prefix = query.ia.to_string().into_bytes();
        prefix.push(KEY_SEPARATOR);
        prefix.extend_from_slice(&query.subject_key_id);
        for entry in self.chains.scan_prefix(prefix) {
            let (_, value) = entry?;
            self.collect_match(&value, query, &mut out)?;
        }
        Ok(out)
    }

    fn insert_chain(&self, chain: &Chain) -> Result<bool, TrustDbError> {
        if chain.as_cert.is_empty() || chain.ca_cert.is_empty() {
            return Err(TrustDbError::InvalidChain(
                "expected an AS certificate and a CA certificate".to_string(),
            ));
        }
        let info = chain.as_cert_info()?;

        let mut key = info.ia.to_string().into_bytes();
        key.push(KEY_SEPARATOR);
        key.extend_from_slice(&info.subject_key_id);
        key.extend_from_slice(&chain_id(&chain.as_cert, &chain.ca_cert));

        let mut value = chain.as_cert.clone();
        value.extend_from_slice(&chain.ca_cert);

        let inserted = self
            .chains
            .transaction(|tx| {
                if tx.get(key.as_slice())?.is_some() {
                    return Ok(false);
                }
                tx.insert(key.as_slice(), value.as_slice())?;
                Ok(true)
            })
            .map_err(|e: TransactionError| TrustDbError::from(unwrap_storage(e)))?;
        if inserted {
            self.chains.flush()?;
        }
        Ok(inserted)
    }

    fn signed_trc(&self, id: TrcId) -> Result<Option<Trc>, TrustDbError> {
        if id.base.is_latest() != id.serial.is_latest() {
            return Err(TrustDbError::UnsupportedQuery(id));
        }
        let raw = if id.base.is_latest() {
            match self.trcs.scan_prefix(id.isd.0.to_be_bytes()).last() {
                Some(entry) => Some(entry?.1),
                None => None,
            }
        } else {
            self.trcs.get(trc_key(id))?
        };
        match raw {
            Some(raw) => Ok(Some(Trc::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn insert_trc(&self, trc: &Trc) -> Result<bool, TrustDbError> {
        let key = trc_key(trc.id);
        let id = trc.id;
        let raw = trc.raw.clone();
        let inserted = self
            .trcs
            .transaction(move |tx| {
                if let Some(existing) = tx.get(key.as_slice())? {
                    if existing.as_ref() == raw.as_slice() {
                        return Ok(false);
                    }
                    return Err(ConflictableTransactionError::Abort(
                        TrustDbError::ConflictingTrc(id),
                    ));
                }
                tx.insert(key.as_slice(), raw.as_slice())?;
                Ok(true)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })?;
        if inserted {
            self.trcs.flush()?;
        }
        Ok(inserted)
    }

    fn close(&self) -> Result<(), TrustDbError> {
        self.db.flush()?;
        Ok(())
    }
}

fn trc_key(id: TrcId) -> [u8; 18] {
    let mut key = [0u8; 18];
    key[..2].copy_from_slice(&id.isd.0.to_be_bytes());
    key[2..10].copy_from_slice(&id.base.0.to_be_bytes());
    key[10..].copy_from_slice(&id.serial.0.to_be_bytes());
    key
}

fn unwrap_storage(e: TransactionError) -> sled::Error {
    match e {
        TransactionError::Storage(e) => e,
        // The chain transaction never aborts.
        TransactionError::Abort(_) => unreachable!("chain insertion does not abort"),
    }
}

/// Splits the stored concatenation of two DER certificates.
fn split_chain(value: &[u8]) -> Result<Chain, TrustDbError> {
    let len = der_length(value)?;
    if len >= value.len() {
        return Err(TrustDbError::InvalidChain(
            "stored chain is missing the CA certificate".to_string(),
        ));
    }
    Ok(Chain {
        as_cert: value[..len].to_vec(),
        ca_cert: value[len..].to_vec(),
    })
}

/// Total length of the first DER SEQUENCE in the buffer.
fn der_length(der: &[u8]) -> Result<usize, TrustDbError> {
    let malformed = || TrustDbError::InvalidChain("malformed DER certificate".to_string());
    if der.len() < 2 || der[0] != 0x30 {
        return Err(malformed());
    }
    let first = der[1] as usize;
    if first & 0x80 == 0 {
        return Ok(2 + first);
    }
    let num_bytes = first & 0x7f;
    if num_bytes == 0 || num_bytes > 4 || der.len() < 2 + num_bytes {
        return Err(malformed());
    }
    let mut len = 0usize;
    for byte in &der[2..2 + num_bytes] {
        len = len << 8 | *byte as usize;
    }
    Ok(2 + num_bytes + len)
}
