//! Client initialization shared by every page script

use log::{debug, info};
use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::auth::IdentityClient;
use crate::config::{GateOptions, ProjectConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::error::Error;
use crate::gate::AuthGate;
use crate::policy::AccessPolicy;
use crate::store::RestStore;
use crate::ui::{NamePrompt, PageSurface};

static GLOBAL: Lazy<AppRegistry> = Lazy::new(AppRegistry::new);

/// Connected clients for one project
pub struct App {
    config: ProjectConfig,
    url: Url,
    http_client: Client,
    identity: Arc<IdentityClient>,
}

impl App {
    /// Validate the settings and build the clients
    pub fn initialize(config: ProjectConfig) -> Result<Self, Error> {
        config.validate()?;
        let url = config.service_url()?;
        let http_client = Client::new();
        let identity = Arc::new(
            IdentityClient::new(url.clone(), &config.api_key, http_client.clone())
                .with_timeout(Some(DEFAULT_REQUEST_TIMEOUT)),
        );

        info!("Initialized app for project {}", config.project_id);
        Ok(Self {
            config,
            url,
            http_client,
            identity,
        })
    }

    /// Settings this app was built from
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Identity client
    pub fn identity(&self) -> Arc<IdentityClient> {
        Arc::clone(&self.identity)
    }

    /// Profile store and allowlist for the collections named in `options`
    pub fn store(&self, options: &GateOptions) -> RestStore {
        RestStore::new(self.url.clone(), &self.config.api_key, self.http_client.clone())
            .with_profile_collection(&options.profile_collection)
            .with_allowlist_collection(&options.allowlist_collection)
            .with_timeout(options.request_timeout)
    }

    /// Gate wired to this app's identity client and REST store
    pub fn gate(
        &self,
        policy: AccessPolicy,
        surface: Arc<dyn PageSurface>,
        prompt: Arc<dyn NamePrompt>,
        options: GateOptions,
    ) -> AuthGate {
        let store = Arc::new(self.store(&options));
        let consult_allowlist = policy.uses_allowlist();
        let gate = AuthGate::new(
            self.identity(),
            store.clone(),
            policy,
            surface,
            prompt,
            options,
        );
        if consult_allowlist {
            gate.with_allowlist(store)
        } else {
            gate
        }
    }
}

/// Initialized apps. Initialization is a no-op once any app exists.
#[derive(Default)]
pub struct AppRegistry {
    apps: Mutex<Vec<Arc<App>>>,
}

impl AppRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static AppRegistry {
        &GLOBAL
    }

    /// Return the first initialized app, or initialize one from `config`
    pub fn get_or_init(&self, config: ProjectConfig) -> Result<Arc<App>, Error> {
        let mut apps = match self.apps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(app) = apps.first() {
            if app.config != config {
                debug!(
                    "App for {} already initialized, ignoring settings for {}",
                    app.config.project_id, config.project_id
                );
            }
            return Ok(Arc::clone(app));
        }

        let app = Arc::new(App::initialize(config)?);
        apps.push(Arc::clone(&app));
        Ok(app)
    }

    /// Number of initialized apps
    pub fn len(&self) -> usize {
        match self.apps.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether no app has been initialized
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
