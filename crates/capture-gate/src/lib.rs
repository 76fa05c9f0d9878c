//! Interception gate: a pure, stateless verdict over observed network
//! events. The capture ledger consults it before creating any record, so
//! everything downstream only ever sees traffic this crate let through.
//!
//! Rules are ordered and the first decisive one wins:
//! 1. deny excluded hosts/schemes (loopback, control plane, dev tooling)
//! 2. deny CORS preflight (`OPTIONS`)
//! 3. deny static resource categories (stylesheet/script/image/font/media)
//! 4. allow XHR/Fetch unconditionally
//! 5. allow URLs with API-likelihood signatures
//! 6. navigations: deny static-asset URLs, allow the rest
//! 7. deny everything else
//!
//! Ambiguity fails closed (an unparseable navigation URL is denied); only
//! rule 4 fails open, because the resource category alone already marks the
//! event as application data.

mod rules;

use serde::{Deserialize, Serialize};
use tapforge_core_types::ResourceKind;

/// The slice of a network event the gate looks at.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub url: String,
    pub method: String,
    pub resource: ResourceKind,
}

impl TrafficEvent {
    pub fn new(url: impl Into<String>, method: impl Into<String>, resource: ResourceKind) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            resource,
        }
    }
}

/// Which rule decided an event, named for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Rule 1: excluded host or non-network scheme.
    Excluded,
    /// Rule 2: CORS preflight.
    Preflight,
    /// Rule 3: static resource category.
    StaticResource,
    /// Rule 4: XHR/Fetch, always application data.
    DataCall,
    /// Rule 5: URL carries an API signature.
    ApiLikeUrl,
    /// Rule 6, allow side: navigation that may embed data.
    Navigation,
    /// Rule 6, deny side: navigation to a static asset.
    StaticNavigation,
    /// Rule 7: nothing matched.
    Unclassified,
}

impl Verdict {
    pub fn allows(self) -> bool {
        matches!(self, Self::DataCall | Self::ApiLikeUrl | Self::Navigation)
    }
}

/// Run the ordered rule list and report which rule fired.
pub fn classify(event: &TrafficEvent) -> Verdict {
    if rules::is_excluded_url(&event.url) {
        return Verdict::Excluded;
    }
    if event.method.eq_ignore_ascii_case("OPTIONS") {
        return Verdict::Preflight;
    }
    if event.resource.is_static_asset() {
        return Verdict::StaticResource;
    }
    if event.resource.is_data_call() {
        return Verdict::DataCall;
    }
    if rules::has_api_signature(&event.url) {
        return Verdict::ApiLikeUrl;
    }
    if event.resource.is_navigation() {
        return if rules::looks_static(&event.url) {
            Verdict::StaticNavigation
        } else {
            Verdict::Navigation
        };
    }
    Verdict::Unclassified
}

/// The gate's single question: is this event worth a ledger record?
pub fn should_intercept(event: &TrafficEvent) -> bool {
    classify(event).allows()
}
