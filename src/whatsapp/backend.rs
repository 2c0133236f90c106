//! `whatsapp-rust` storage traits over [`CredentialStore`] buckets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use wacore::appstate::hash::HashState;
use wacore::appstate::processor::AppStateMutationMAC;
use wacore::store::Device;
use wacore::store::error::{Result, StoreError, db_err};
use wacore::store::traits::{
    AppStateSyncKey, AppSyncStore, DeviceListRecord, DeviceStore, LidPnMappingEntry, ProtocolStore,
    SignalStore,
};

use crate::store::CredentialStore;

const DEVICE_ID: i32 = 1;
const DEVICE_KEY: &[u8] = b"1";

mod bucket {
    pub const IDENTITY: &str = "identity";
    pub const SESSION: &str = "session";
    pub const PREKEY: &str = "prekey";
    pub const SIGNED_PREKEY: &str = "signed_prekey";
    pub const SENDER_KEY: &str = "sender_key";
    pub const SYNC_KEY: &str = "sync_key";
    pub const APP_VERSION: &str = "app_version";
    pub const LID: &str = "lid";
    pub const PN: &str = "pn";
    pub const BASE_KEY: &str = "base_key";
    pub const DEVICE_LIST: &str = "device_list";
    pub const DEVICE: &str = "device";

    pub fn mutation_macs(name: &str) -> String {
        format!("mutation_mac:{}", name)
    }

    pub fn skdm(group_jid: &str) -> String {
        format!("skdm:{}", group_jid)
    }

    pub fn forget(group_jid: &str) -> String {
        format!("forget:{}", group_jid)
    }
}

/// Serialized form of a LID to phone-number mapping.
#[derive(Serialize, Deserialize)]
struct LidRecord {
    lid: String,
    phone_number: String,
    created_at: i64,
    updated_at: i64,
    learning_source: String,
}

impl From<&LidPnMappingEntry> for LidRecord {
    fn from(entry: &LidPnMappingEntry) -> Self {
        Self {
            lid: entry.lid.clone(),
            phone_number: entry.phone_number.clone(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            learning_source: entry.learning_source.clone(),
        }
    }
}

impl From<LidRecord> for LidPnMappingEntry {
    fn from(record: LidRecord) -> Self {
        LidPnMappingEntry {
            lid: record.lid,
            phone_number: record.phone_number,
            created_at: record.created_at,
            updated_at: record.updated_at,
            learning_source: record.learning_source,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn base_key_id(address: &str, message_id: &str) -> Vec<u8> {
    format!("{}\u{1f}{}", address, message_id).into_bytes()
}

/// Storage backend handed to the WhatsApp client.
#[derive(Clone)]
pub struct StoreBackend {
    store: CredentialStore,
}

impl StoreBackend {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    async fn get_json<T: DeserializeOwned>(&self, bucket: &str, key: &[u8]) -> Result<Option<T>> {
        match self.store.get(bucket, key).await.map_err(db_err)? {
            Some(bytes) => Ok(Some(from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize>(&self, bucket: &str, key: &[u8], value: &T) -> Result<()> {
        self.store
            .put(bucket, key, &to_json(value)?)
            .await
            .map_err(db_err)
    }

    async fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.store.put(bucket, key, value).await.map_err(db_err)
    }

    async fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(bucket, key).await.map_err(db_err)
    }

    async fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        self.store.delete(bucket, key).await.map_err(db_err)
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>> {
        let entries = self.store.list(bucket).await.map_err(db_err)?;
        Ok(entries
            .into_iter()
            .map(|(key, _)| String::from_utf8_lossy(&key).into_owned())
            .collect())
    }

    /// Whether a paired device record exists and decodes.
    pub async fn is_paired(&self) -> Result<bool> {
        Ok(self
            .get(bucket::DEVICE, DEVICE_KEY)
            .await?
            .is_some_and(|bytes| rmp_serde::from_slice::<Device>(&bytes).is_ok()))
    }
}

#[async_trait]
impl SignalStore for StoreBackend {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<()> {
        self.put(bucket::IDENTITY, address.as_bytes(), &key).await
    }

    async fn load_identity(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(bucket::IDENTITY, address.as_bytes()).await
    }

    async fn delete_identity(&self, address: &str) -> Result<()> {
        self.delete(bucket::IDENTITY, address.as_bytes()).await
    }

    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(bucket::SESSION, address.as_bytes()).await
    }

    async fn put_session(&self, address: &str, session: &[u8]) -> Result<()> {
        self.put(bucket::SESSION, address.as_bytes(), session).await
    }

    async fn delete_session(&self, address: &str) -> Result<()> {
        self.delete(bucket::SESSION, address.as_bytes()).await
    }

    async fn store_prekey(&self, id: u32, record: &[u8], _uploaded: bool) -> Result<()> {
        self.put(bucket::PREKEY, &id.to_be_bytes(), record).await
    }

    async fn load_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(bucket::PREKEY, &id.to_be_bytes()).await
    }

    async fn remove_prekey(&self, id: u32) -> Result<()> {
        self.delete(bucket::PREKEY, &id.to_be_bytes()).await
    }

    async fn store_signed_prekey(&self, id: u32, record: &[u8]) -> Result<()> {
        self.put(bucket::SIGNED_PREKEY, &id.to_be_bytes(), record)
            .await
    }

    async fn load_signed_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(bucket::SIGNED_PREKEY, &id.to_be_bytes()).await
    }

    async fn load_all_signed_prekeys(&self) -> Result<Vec<(u32, Vec<u8>)>> {
        let entries = self
            .store
            .list(bucket::SIGNED_PREKEY)
            .await
            .map_err(db_err)?;
        entries
            .into_iter()
            .map(|(key, record)| {
                let id: [u8; 4] = key.as_slice().try_into().map_err(|_| {
                    StoreError::Serialization(format!("bad signed prekey id: {:?}", key))
                })?;
                Ok((u32::from_be_bytes(id), record))
            })
            .collect()
    }

    async fn remove_signed_prekey(&self, id: u32) -> Result<()> {
        self.delete(bucket::SIGNED_PREKEY, &id.to_be_bytes()).await
    }

    async fn put_sender_key(&self, address: &str, record: &[u8]) -> Result<()> {
        self.put(bucket::SENDER_KEY, address.as_bytes(), record)
            .await
    }

    async fn get_sender_key(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(bucket::SENDER_KEY, address.as_bytes()).await
    }

    async fn delete_sender_key(&self, address: &str) -> Result<()> {
        self.delete(bucket::SENDER_KEY, address.as_bytes()).await
    }
}

#[async_trait]
impl AppSyncStore for StoreBackend {
    async fn get_sync_key(&self, key_id: &[u8]) -> Result<Option<AppStateSyncKey>> {
        self.get_json(bucket::SYNC_KEY, key_id).await
    }

    async fn set_sync_key(&self, key_id: &[u8], key: AppStateSyncKey) -> Result<()> {
        self.put_json(bucket::SYNC_KEY, key_id, &key).await
    }

    async fn get_version(&self, name: &str) -> Result<HashState> {
        Ok(self
            .get_json(bucket::APP_VERSION, name.as_bytes())
            .await?
            .unwrap_or_default())
    }

    async fn set_version(&self, name: &str, state: HashState) -> Result<()> {
        self.put_json(bucket::APP_VERSION, name.as_bytes(), &state)
            .await
    }

    async fn put_mutation_macs(
        &self,
        name: &str,
        _version: u64,
        mutations: &[AppStateMutationMAC],
    ) -> Result<()> {
        let bucket = bucket::mutation_macs(name);
        for m in mutations {
            self.put(&bucket, &m.index_mac, &m.value_mac).await?;
        }
        Ok(())
    }

    async fn get_mutation_mac(&self, name: &str, index_mac: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(&bucket::mutation_macs(name), index_mac).await
    }

    async fn delete_mutation_macs(&self, name: &str, index_macs: &[Vec<u8>]) -> Result<()> {
        let bucket = bucket::mutation_macs(name);
        for mac in index_macs {
            self.delete(&bucket, mac).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolStore for StoreBackend {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        self.keys(&bucket::skdm(group_jid)).await
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        let bucket = bucket::skdm(group_jid);
        for jid in device_jids {
            self.put(&bucket, jid.as_bytes(), &[]).await?;
        }
        Ok(())
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        self.store
            .delete_bucket(&bucket::skdm(group_jid))
            .await
            .map_err(db_err)
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        let record: Option<LidRecord> = self.get_json(bucket::LID, lid.as_bytes()).await?;
        Ok(record.map(Into::into))
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        match self.get(bucket::PN, phone.as_bytes()).await? {
            Some(lid) => self.get_lid_mapping(&String::from_utf8_lossy(&lid)).await,
            None => Ok(None),
        }
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        let mut record = LidRecord::from(entry);
        if let Some(existing) = self
            .get_json::<LidRecord>(bucket::LID, entry.lid.as_bytes())
            .await?
        {
            record.created_at = existing.created_at;
        }
        self.put_json(bucket::LID, entry.lid.as_bytes(), &record)
            .await?;
        self.put(
            bucket::PN,
            entry.phone_number.as_bytes(),
            entry.lid.as_bytes(),
        )
        .await
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        let entries = self.store.list(bucket::LID).await.map_err(db_err)?;
        entries
            .iter()
            .map(|(_, bytes)| from_json::<LidRecord>(bytes).map(Into::into))
            .collect()
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        self.put(bucket::BASE_KEY, &base_key_id(address, message_id), base_key)
            .await
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        Ok(self
            .get(bucket::BASE_KEY, &base_key_id(address, message_id))
            .await?
            .is_some_and(|stored| stored == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        self.delete(bucket::BASE_KEY, &base_key_id(address, message_id))
            .await
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        self.put_json(bucket::DEVICE_LIST, record.user.as_bytes(), &record)
            .await
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        self.get_json(bucket::DEVICE_LIST, user.as_bytes()).await
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        self.put(&bucket::forget(group_jid), participant.as_bytes(), &[])
            .await
    }

    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let bucket = bucket::forget(group_jid);
        let participants = self.keys(&bucket).await?;
        if !participants.is_empty() {
            self.store.delete_bucket(&bucket).await.map_err(db_err)?;
        }
        Ok(participants)
    }
}

#[async_trait]
impl DeviceStore for StoreBackend {
    async fn save(&self, device: &Device) -> Result<()> {
        let bytes =
            rmp_serde::to_vec(device).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(bucket::DEVICE, DEVICE_KEY, &bytes).await
    }

    async fn load(&self) -> Result<Option<Device>> {
        let Some(bytes) = self.get(bucket::DEVICE, DEVICE_KEY).await? else {
            return Ok(None);
        };
        match rmp_serde::from_slice(&bytes) {
            Ok(device) => Ok(Some(device)),
            Err(e) => {
                tracing::warn!("Discarding undecodable device record ({}), re-pair required", e);
                self.delete(bucket::DEVICE, DEVICE_KEY).await?;
                Ok(None)
            }
        }
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.get(bucket::DEVICE, DEVICE_KEY).await?.is_some())
    }

    async fn create(&self) -> Result<i32> {
        Ok(DEVICE_ID)
    }
}
