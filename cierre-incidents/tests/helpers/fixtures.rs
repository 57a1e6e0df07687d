//! Incident fixtures

use cierre_incidents::models::{AffectedElement, Incident, IncidentType, SetId, Severity};
use std::sync::Once;
use std::time::Duration;

static LOGGING: Once = Once::new();

/// Route tracing output through the test harness (RUST_LOG controls the level)
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn element(account_code: &str, has_exception: bool) -> AffectedElement {
    AffectedElement {
        account_code: account_code.to_string(),
        description: format!("Cuenta {}", account_code),
        set_id: None,
        set_name: None,
        has_exception,
    }
}

/// Account-wide incident over `(account, has_exception)` pairs
pub fn incident(incident_type: IncidentType, accounts: &[(&str, bool)]) -> Incident {
    Incident {
        incident_type,
        severity: Severity::High,
        message: format!("{} en el cierre", incident_type),
        affected: accounts
            .iter()
            .map(|(account, flag)| element(account, *flag))
            .collect(),
        count: accounts.len() as u32,
    }
}

/// Classification incident over `(account, set, has_exception)` triples
pub fn classification_incident(rows: &[(&str, i64, bool)]) -> Incident {
    Incident {
        incident_type: IncidentType::UnclassifiedAccount,
        severity: Severity::Medium,
        message: "Cuentas sin clasificar".to_string(),
        affected: rows
            .iter()
            .map(|(account, set, flag)| AffectedElement {
                set_id: Some(SetId(*set)),
                set_name: Some(format!("Set {}", set)),
                ..element(account, *flag)
            })
            .collect(),
        count: rows.len() as u32,
    }
}

/// Poll `condition` until it holds; panics after 5 seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
