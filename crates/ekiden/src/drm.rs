//! DRM session manager lookup, cached per configuration.
//!
//! Key exchange happens outside this crate. Managers here only answer which
//! kind of decryption a format needs.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use crate::format::{Format, TrackType};

pub const WIDEVINE_UUID: u128 = 0xedef8ba9_79d6_4ace_a3c8_27dcd51d21ed;
pub const PLAYREADY_UUID: u128 = 0x9a04f079_9840_4286_ab92_e65be0885f95;
pub const CLEARKEY_UUID: u128 = 0xe2719d58_a985_b3c9_781a_b030af78d30e;

/// DRM properties of a media item, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrmConfiguration {
    pub scheme: u128,
    pub license_uri: Option<String>,
    pub force_default_license_uri: bool,
    pub license_request_headers: BTreeMap<String, String>,
    pub multi_session: bool,
    pub play_clear_content_without_key: bool,
    pub forced_session_track_types: Vec<TrackType>,
    pub key_set_id: Option<Vec<u8>>,
}

impl DrmConfiguration {
    pub fn new(scheme: u128) -> Self {
        Self {
            scheme,
            license_uri: None,
            force_default_license_uri: false,
            license_request_headers: BTreeMap::new(),
            multi_session: false,
            play_clear_content_without_key: false,
            forced_session_track_types: Vec::new(),
            key_set_id: None,
        }
    }

    pub fn license_uri(mut self, license_uri: impl Into<String>) -> Self {
        self.license_uri = Some(license_uri.into());
        self
    }

    pub fn license_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.license_request_headers.insert(name.into(), value.into());
        self
    }

    pub fn multi_session(mut self, multi_session: bool) -> Self {
        self.multi_session = multi_session;
        self
    }

    pub fn play_clear_content_without_key(mut self, play: bool) -> Self {
        self.play_clear_content_without_key = play;
        self
    }

    pub fn forced_session_track_types(mut self, track_types: Vec<TrackType>) -> Self {
        self.forced_session_track_types = track_types;
        self
    }

    pub fn key_set_id(mut self, key_set_id: Vec<u8>) -> Self {
        self.key_set_id = Some(key_set_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoType {
    /// No decryption is needed.
    None,
    /// The format is protected by a scheme that cannot be handled.
    Unsupported,
    Supported,
}

pub trait DrmSessionManager: Send + Sync + fmt::Debug {
    fn crypto_type(&self, format: &Format) -> CryptoType;
}

/// Manager used when no DRM is configured: any protected format is
/// unsupported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsupportedDrmSessionManager;

pub const DRM_UNSUPPORTED: UnsupportedDrmSessionManager = UnsupportedDrmSessionManager;

impl DrmSessionManager for UnsupportedDrmSessionManager {
    fn crypto_type(&self, format: &Format) -> CryptoType {
        if format.drm_scheme.is_some() {
            CryptoType::Unsupported
        } else {
            CryptoType::None
        }
    }
}

/// Session manager for one DRM configuration.
#[derive(Debug)]
pub struct DefaultDrmSessionManager {
    configuration: DrmConfiguration,
}

impl DefaultDrmSessionManager {
    pub fn new(configuration: DrmConfiguration) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &DrmConfiguration {
        &self.configuration
    }
}

impl DrmSessionManager for DefaultDrmSessionManager {
    fn crypto_type(&self, format: &Format) -> CryptoType {
        match format.drm_scheme {
            Some(scheme) if scheme == self.configuration.scheme => CryptoType::Supported,
            Some(_) => CryptoType::Unsupported,
            None if self
                .configuration
                .forced_session_track_types
                .contains(&format.track_type()) =>
            {
                CryptoType::Supported
            }
            None => CryptoType::None,
        }
    }
}

/// What a provider hands out.
#[derive(Debug, Clone)]
pub enum DrmSessionManagerHandle {
    Unsupported,
    Managed(Arc<dyn DrmSessionManager>),
}

impl DrmSessionManagerHandle {
    pub fn crypto_type(&self, format: &Format) -> CryptoType {
        match self {
            DrmSessionManagerHandle::Unsupported => DRM_UNSUPPORTED.crypto_type(format),
            DrmSessionManagerHandle::Managed(manager) => manager.crypto_type(format),
        }
    }

    /// Whether both handles refer to the same manager instance.
    pub fn same_manager(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unsupported, Self::Unsupported) => true,
            (Self::Managed(a), Self::Managed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub trait DrmSessionManagerProvider: Send + Sync {
    fn get(&self, configuration: Option<&DrmConfiguration>) -> DrmSessionManagerHandle;
}

pub type DrmSessionManagerFactory =
    Box<dyn Fn(&DrmConfiguration) -> Arc<dyn DrmSessionManager> + Send + Sync>;

/// Builds at most one manager per distinct configuration and keeps it.
pub struct DefaultDrmSessionManagerProvider {
    managers: RwLock<HashMap<DrmConfiguration, Arc<dyn DrmSessionManager>>>,
    factory: DrmSessionManagerFactory,
}

impl Default for DefaultDrmSessionManagerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultDrmSessionManagerProvider {
    pub fn new() -> Self {
        Self::with_factory(|configuration| {
            Arc::new(DefaultDrmSessionManager::new(configuration.clone()))
        })
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&DrmConfiguration) -> Arc<dyn DrmSessionManager> + Send + Sync + 'static,
    {
        Self {
            managers: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }
}

impl DrmSessionManagerProvider for DefaultDrmSessionManagerProvider {
    fn get(&self, configuration: Option<&DrmConfiguration>) -> DrmSessionManagerHandle {
        let Some(configuration) = configuration else {
            return DrmSessionManagerHandle::Unsupported;
        };

        if let Some(manager) = self
            .managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(configuration)
        {
            return DrmSessionManagerHandle::Managed(manager.clone());
        }

        // Creation is exclusive, so racing callers still share one manager.
        let mut managers = self.managers.write().unwrap_or_else(PoisonError::into_inner);
        let manager = managers
            .entry(configuration.clone())
            .or_insert_with(|| {
                tracing::info!(
                    scheme = format!("{:032x}", configuration.scheme),
                    "Created DRM session manager"
                );
                (self.factory)(configuration)
            })
            .clone();
        DrmSessionManagerHandle::Managed(manager)
    }
}
