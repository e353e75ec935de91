use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use survey_forms::auth::AuthService;
use survey_forms::config::AppConfig;
use survey_forms::error::AppError;
use survey_forms::forms::{
    AnalyticsService, FormAdminService, FormsState, ResponseAggregator, SurveyService,
};
use survey_forms::sync::{
    CrmAccounts, GoogleSheetsClient, PropertyCatalog, SheetDestination, SyncDispatcher,
    SyncTargets,
};
use survey_forms::InMemorySurveyStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything the router needs, plus the sync worker to drain on shutdown.
pub(crate) struct Services {
    pub(crate) forms: FormsState,
    pub(crate) auth: AuthService,
    pub(crate) dispatcher: Arc<SyncDispatcher>,
}

/// Wires the in-memory store, outbound integrations and services. Must run
/// inside the Tokio runtime because the sync worker is spawned here.
pub(crate) fn build_services(config: &AppConfig) -> Result<Services, AppError> {
    let store = InMemorySurveyStore::new();

    let auth = AuthService::new(Arc::new(store.clone()), &config.auth);
    if let Some((email, password)) = config.auth.bootstrap_admin() {
        let admin = auth.seed_admin(email, password)?;
        tracing::info!(email = %admin.email, "admin account ready");
    }

    let crm = Arc::new(CrmAccounts::from_configs(&config.crm.accounts)?);
    let sheets = match &config.sheets {
        Some(sheets) => Some(SheetDestination {
            gateway: Arc::new(GoogleSheetsClient::new(sheets)?),
            spreadsheet_id: sheets.spreadsheet_id.clone(),
            range: sheets.range.clone(),
        }),
        None => None,
    };
    let dispatcher = Arc::new(SyncDispatcher::start(SyncTargets {
        crm: crm.clone(),
        sheets,
    }));

    let admin = FormAdminService::new(Arc::new(store.clone()), Arc::new(store.clone()));
    let aggregator = ResponseAggregator::new(Arc::new(store.clone()), Arc::new(store.clone()));
    let survey = SurveyService::new(admin.clone(), aggregator, dispatcher.clone());
    let analytics = AnalyticsService::new(admin.clone(), Arc::new(store));

    let forms = FormsState {
        admin,
        survey,
        analytics,
        properties: Arc::new(PropertyCatalog::new(crm, config.crm.property_cache_ttl)),
        crm_accounts: Arc::new(
            config
                .crm
                .accounts
                .iter()
                .map(|account| account.name.clone())
                .collect(),
        ),
    };

    Ok(Services {
        forms,
        auth,
        dispatcher,
    })
}
