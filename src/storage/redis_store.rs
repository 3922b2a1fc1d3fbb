// Redis-backed identity store
// Shared across instances; every mutation that must stay consistent with the
// device set runs as a Lua script, so Redis executes it as one atomic step.
//
// Layout per identity. Each key type has its own namespace and the identity
// key is always the final segment, so no identity key can name another
// identity's data.
//   {prefix}:identity:{key}  hash: profile (json), last_login_at, total_tests, last_test_at
//   {prefix}:devices:{key}   set of device fingerprints
//   {prefix}:results:{key}   list of test results (json), newest first
//   {prefix}:identities      set of all identity keys

use super::*;
use async_trait::async_trait;
use chrono::SecondsFormat;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, RedisError, Script};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, error};

use crate::models::IdentityRole;

const ADMIT_SCRIPT: &str = r#"
    local record = KEYS[1]
    local devices = KEYS[2]
    local fingerprint = ARGV[1]
    local cap = tonumber(ARGV[2])
    local now = ARGV[3]

    if redis.call('EXISTS', record) == 0 then
        return {0, 0, 0, 0}
    end

    if redis.call('SISMEMBER', devices, fingerprint) == 1 then
        redis.call('HSET', record, 'last_login_at', now)
        return {1, 1, 0, redis.call('SCARD', devices)}
    end

    local count = redis.call('SCARD', devices)
    if count >= cap then
        return {1, 0, 0, count}
    end

    redis.call('SADD', devices, fingerprint)
    redis.call('HSET', record, 'last_login_at', now)
    return {1, 0, 1, count + 1}
"#;

// Merges only the provided fields into the stored profile
const PATCH_PROFILE_SCRIPT: &str = r#"
    local raw = redis.call('HGET', KEYS[1], 'profile')
    if not raw then
        return 0
    end
    local profile = cjson.decode(raw)
    for field, value in pairs(cjson.decode(ARGV[1])) do
        profile[field] = value
    end
    redis.call('HSET', KEYS[1], 'profile', cjson.encode(profile))
    return 1
"#;

const REMOVE_DEVICE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    return redis.call('SREM', KEYS[2], ARGV[1])
"#;

const CLEAR_DEVICES_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    local count = redis.call('SCARD', KEYS[2])
    redis.call('DEL', KEYS[2])
    return count
"#;

const RECORD_RESULT_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('LPUSH', KEYS[2], ARGV[1])
    redis.call('HINCRBY', KEYS[1], 'total_tests', 1)
    redis.call('HSET', KEYS[1], 'last_test_at', ARGV[2])
    return 1
"#;

/// Fields of the record that change only through profile edits
#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    name: Option<String>,
    surname: Option<String>,
    photo_url: Option<String>,
    role: IdentityRole,
    created_at: DateTime<Utc>,
}

impl StoredProfile {
    fn from_record(record: &IdentityRecord) -> Self {
        Self {
            name: record.name.clone(),
            surname: record.surname.clone(),
            photo_url: record.photo_url.clone(),
            role: record.role,
            created_at: record.created_at,
        }
    }
}

/// Key names under one prefix
#[derive(Debug, Clone)]
struct KeySpace {
    prefix: String,
}

impl KeySpace {
    fn record(&self, identity_key: &str) -> String {
        format!("{}:identity:{}", self.prefix, identity_key)
    }

    fn devices(&self, identity_key: &str) -> String {
        format!("{}:devices:{}", self.prefix, identity_key)
    }

    fn results(&self, identity_key: &str) -> String {
        format!("{}:results:{}", self.prefix, identity_key)
    }

    fn index(&self) -> String {
        format!("{}:identities", self.prefix)
    }
}

/// Redis identity store
pub struct RedisIdentityStore {
    /// Multiplexed connection; cloned per operation so callers never queue on a shared lock
    conn: MultiplexedConnection,
    keys: KeySpace,
}

impl RedisIdentityStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connected identity store to {}", redis_url);

        Ok(Self {
            conn,
            keys: KeySpace {
                prefix: key_prefix.to_string(),
            },
        })
    }
}

#[async_trait]
impl IdentityStore for RedisIdentityStore {
    async fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, StorageError> {
        let mut conn = self.conn.clone();

        let (fields, devices): (HashMap<String, String>, HashSet<String>) = redis::pipe()
            .atomic()
            .hgetall(self.keys.record(identity_key))
            .smembers(self.keys.devices(identity_key))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        if fields.is_empty() {
            return Ok(None);
        }

        decode_record(identity_key, fields, devices).map(Some)
    }

    async fn atomic_admit(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
        cap: usize,
        now: DateTime<Utc>,
    ) -> Result<AdmitOutcome, StorageError> {
        let mut conn = self.conn.clone();

        let reply: Vec<i64> = Script::new(ADMIT_SCRIPT)
            .key(self.keys.record(identity_key))
            .key(self.keys.devices(identity_key))
            .arg(device_fingerprint)
            .arg(cap)
            .arg(encode_timestamp(now))
            .invoke_async::<_, Vec<i64>>(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis admission script failed for {}: {}", identity_key, e);
                store_error(e)
            })?;

        match reply.as_slice() {
            [found, present, admitted, count] => Ok(AdmitOutcome {
                record_found: *found == 1,
                already_present: *present == 1,
                admitted: *admitted == 1,
                device_count: *count as usize,
            }),
            other => Err(StorageError::InvalidData(format!(
                "Unexpected admission reply: {:?}",
                other
            ))),
        }
    }

    async fn create(&self, record: IdentityRecord) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let profile = serde_json::to_string(&StoredProfile::from_record(&record))
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        // HSETNX on the profile field doubles as the existence check
        let created: bool = conn
            .hset_nx(self.keys.record(&record.identity_key), "profile", profile)
            .await
            .map_err(store_error)?;

        if !created {
            return Err(StorageError::AlreadyExists);
        }

        let _: () = redis::pipe()
            .hset(self.keys.record(&record.identity_key), "total_tests", 0)
            .ignore()
            .sadd(self.keys.index(), &record.identity_key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>, StorageError> {
        let mut conn = self.conn.clone();
        let keys: HashSet<String> = conn
            .smembers(self.keys.index())
            .await
            .map_err(store_error)?;
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.get(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete(&self, identity_key: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();

        let (deleted, _, _, _): (i64, i64, i64, i64) = redis::pipe()
            .atomic()
            .del(self.keys.record(identity_key))
            .del(self.keys.devices(identity_key))
            .del(self.keys.results(identity_key))
            .srem(self.keys.index(), identity_key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(deleted > 0)
    }

    async fn update_profile(
        &self,
        identity_key: &str,
        update: ProfileUpdate,
    ) -> Result<Option<IdentityRecord>, StorageError> {
        let mut conn = self.conn.clone();
        let updated: i64 = Script::new(PATCH_PROFILE_SCRIPT)
            .key(self.keys.record(identity_key))
            .arg(profile_patch(update))
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(store_error)?;

        if updated == 0 {
            return Ok(None);
        }
        self.get(identity_key).await
    }

    async fn remove_device(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
    ) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let removed: i64 = Script::new(REMOVE_DEVICE_SCRIPT)
            .key(self.keys.record(identity_key))
            .key(self.keys.devices(identity_key))
            .arg(device_fingerprint)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(store_error)?;

        match removed {
            -1 => Err(StorageError::NotFound),
            n => Ok(n > 0),
        }
    }

    async fn clear_devices(&self, identity_key: &str) -> Result<usize, StorageError> {
        let mut conn = self.conn.clone();
        let cleared: i64 = Script::new(CLEAR_DEVICES_SCRIPT)
            .key(self.keys.record(identity_key))
            .key(self.keys.devices(identity_key))
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(store_error)?;

        match cleared {
            -1 => Err(StorageError::NotFound),
            n => Ok(n as usize),
        }
    }

    async fn record_test_result(
        &self,
        identity_key: &str,
        result: TestResult,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&result)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let mut conn = self.conn.clone();
        let recorded: i64 = Script::new(RECORD_RESULT_SCRIPT)
            .key(self.keys.record(identity_key))
            .key(self.keys.results(identity_key))
            .arg(payload)
            .arg(encode_timestamp(result.completed_at))
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(store_error)?;

        if recorded == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_test_results(&self, identity_key: &str) -> Result<Vec<TestResult>, StorageError> {
        let mut conn = self.conn.clone();

        let (exists, raw): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(self.keys.record(identity_key))
            .lrange(self.keys.results(identity_key), 0, -1)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        if !exists {
            return Err(StorageError::NotFound);
        }

        raw.iter()
            .map(|item| {
                serde_json::from_str(item)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))
            })
            .collect()
    }
}

/// Server replies that mean stored data is not what this store wrote are
/// data errors; everything else is treated as the store being unavailable.
fn store_error(e: RedisError) -> StorageError {
    let wrong_type = e.code() == Some("WRONGTYPE")
        || e.detail().is_some_and(|detail| detail.contains("WRONGTYPE"));

    if wrong_type || e.kind() == ErrorKind::TypeError {
        error!("Unexpected data in identity store: {}", e);
        StorageError::InvalidData(e.to_string())
    } else {
        StorageError::ConnectionError(e.to_string())
    }
}

/// JSON object holding only the fields present in the update
fn profile_patch(update: ProfileUpdate) -> String {
    let mut patch = serde_json::Map::new();
    if let Some(name) = update.name {
        patch.insert("name".to_string(), name.into());
    }
    if let Some(surname) = update.surname {
        patch.insert("surname".to_string(), surname.into());
    }
    if let Some(photo_url) = update.photo_url {
        patch.insert("photo_url".to_string(), photo_url.into());
    }
    serde_json::Value::Object(patch).to_string()
}

fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("{}: {}", field, e)))
}

/// Rebuild a record from its hash fields and device set
fn decode_record(
    identity_key: &str,
    fields: HashMap<String, String>,
    devices: HashSet<String>,
) -> Result<IdentityRecord, StorageError> {
    let profile = fields
        .get("profile")
        .ok_or_else(|| StorageError::InvalidData(format!("{} has no profile", identity_key)))?;
    let profile: StoredProfile = serde_json::from_str(profile)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let last_login_at = fields
        .get("last_login_at")
        .map(|raw| decode_timestamp("last_login_at", raw))
        .transpose()?;
    let last_test_at = fields
        .get("last_test_at")
        .map(|raw| decode_timestamp("last_test_at", raw))
        .transpose()?;
    let total_tests = fields
        .get("total_tests")
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|e| StorageError::InvalidData(format!("total_tests: {}", e)))
        })
        .transpose()?
        .unwrap_or(0);

    let registered_devices: BTreeSet<String> = devices.into_iter().collect();

    Ok(IdentityRecord {
        identity_key: identity_key.to_string(),
        name: profile.name,
        surname: profile.surname,
        photo_url: profile.photo_url,
        role: profile.role,
        device_count: registered_devices.len(),
        registered_devices,
        last_login_at,
        total_tests,
        last_test_at,
        created_at: profile.created_at,
    })
}
