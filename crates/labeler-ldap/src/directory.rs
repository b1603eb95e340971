//! LDAP-backed [`MembershipProvider`]

use std::collections::BTreeMap;
use std::time::Duration;

use futures::channel::mpsc;
use futures::stream::{self, BoxStream};
use futures::{SinkExt, StreamExt};
use labeler_core::config::route_scope;
use labeler_core::rules::looks_like_dn;
use labeler_core::{DirectoryError, DirectoryObject, DomainConfig, MembershipProvider, Scope};
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, SearchEntry};
use tracing::{debug, info, warn};

use crate::filter;
use crate::{Error, Result};

/// LDAP result code for a search base that does not exist
const NO_SUCH_OBJECT: u32 = 32;

/// Entries buffered between the search task and the consumer
const CHANNEL_CAPACITY: usize = 64;

const NAME_ATTRS: [&str; 2] = ["name", "cn"];

type Sender = mpsc::Sender<std::result::Result<DirectoryObject, DirectoryError>>;

/// One bound connection and the settings its queries use
#[derive(Clone)]
struct DomainHandle {
    ldap: Ldap,
    base_dn: String,
    page_size: i32,
    timeout: Duration,
}

/// What the search task has to find
enum Target {
    Subtree { dn: String },
    Group { group: String },
}

/// Membership provider holding one bound connection per configured domain
pub struct LdapDirectory {
    domains: BTreeMap<String, DomainConfig>,
    handles: BTreeMap<String, DomainHandle>,
}

impl LdapDirectory {
    /// Connect and bind to every configured domain
    ///
    /// # Errors
    ///
    /// Fails on the first domain that cannot be reached or refuses the bind.
    pub async fn connect(domains: &BTreeMap<String, DomainConfig>) -> Result<Self> {
        let mut handles = BTreeMap::new();
        for (name, config) in domains {
            let ldap = bind(name, config).await?;
            handles.insert(
                name.clone(),
                DomainHandle {
                    ldap,
                    base_dn: config.base_dn.clone(),
                    page_size: config.page_size.max(1),
                    timeout: Duration::from_secs(config.timeout_secs.max(1)),
                },
            );
        }

        Ok(Self {
            domains: domains.clone(),
            handles,
        })
    }

    /// Names of the connected domains
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    /// Unbind every connection
    pub async fn close(self) {
        for (name, mut handle) in self.handles {
            if let Err(e) = handle.ldap.unbind().await {
                warn!(domain = %name, error = %e, "Unbind failed");
            }
        }
    }

    fn plan(&self, scope: &Scope) -> Result<(DomainHandle, Target)> {
        let name = route_scope(&self.domains, scope).ok_or_else(|| Error::Unroutable {
            scope: scope.to_string(),
        })?;
        let handle = self
            .handles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDomain {
                name: name.to_string(),
            })?;

        let target = match scope {
            Scope::SubtreePath { dn, .. } => Target::Subtree { dn: dn.clone() },
            Scope::GroupMembership { group, .. } => Target::Group {
                group: group.clone(),
            },
        };
        Ok((handle, target))
    }
}

impl MembershipProvider for LdapDirectory {
    fn resolve<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> BoxStream<'a, std::result::Result<DirectoryObject, DirectoryError>> {
        let (handle, target) = match self.plan(scope) {
            Ok(plan) => plan,
            Err(e) => return stream::once(futures::future::ready(Err(e.into()))).boxed(),
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(stream_members(handle, target, tx));
        rx.boxed()
    }
}

async fn bind(name: &str, config: &DomainConfig) -> Result<Ldap> {
    let url = filter::server_url(&config.server);
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    info!(domain = %name, url = %url, "Connecting to directory");

    let settings = LdapConnSettings::new().set_conn_timeout(timeout);
    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
        .await
        .map_err(|e| Error::Connect {
            url: url.clone(),
            message: e.to_string(),
        })?;

    let domain = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            warn!(domain = %domain, error = %e, "Directory connection closed");
        }
    });

    ldap.with_timeout(timeout)
        .simple_bind(&config.bind_user, &config.bind_password)
        .await
        .and_then(LdapResult::success)
        .map_err(|e| Error::Bind {
            user: config.bind_user.clone(),
            message: e.to_string(),
        })?;

    debug!(domain = %name, "Bound to directory");
    Ok(ldap)
}

/// Search task feeding the consumer's channel
async fn stream_members(mut handle: DomainHandle, target: Target, mut tx: Sender) {
    if let Err(e) = search_target(&mut handle, target, &mut tx).await {
        // The consumer may already be gone; nothing left to report to then
        let _ = tx.send(Err(e.into())).await;
    }
}

async fn search_target(handle: &mut DomainHandle, target: Target, tx: &mut Sender) -> Result<()> {
    let (base, search_filter) = match target {
        Target::Subtree { dn } => (dn, filter::COMPUTERS.to_string()),
        Target::Group { group } => {
            let group_dn = find_group(handle, &group).await?;
            (handle.base_dn.clone(), filter::group_members(&group_dn))
        }
    };
    search_computers(handle, &base, &search_filter, tx).await
}

/// Distinguished name of a group given as a DN or a plain common name
async fn find_group(handle: &mut DomainHandle, group: &str) -> Result<String> {
    let (base, scope, search_filter) = if looks_like_dn(group) {
        (group.to_string(), ldap3::Scope::Base, "(objectClass=group)".to_string())
    } else {
        (handle.base_dn.clone(), ldap3::Scope::Subtree, filter::group_by_name(group))
    };

    let (entries, _) = handle
        .ldap
        .with_timeout(handle.timeout)
        .search(&base, scope, &search_filter, vec!["cn"])
        .await
        .and_then(|result| result.success())
        .map_err(|e| classify(e, group))?;

    let entry = entries.into_iter().next().ok_or_else(|| Error::GroupNotFound {
        group: group.to_string(),
    })?;
    let dn = SearchEntry::construct(entry).dn;
    debug!(group = %group, dn = %dn, "Resolved group");
    Ok(dn)
}

async fn search_computers(
    handle: &mut DomainHandle,
    base: &str,
    search_filter: &str,
    tx: &mut Sender,
) -> Result<()> {
    let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
        Box::new(EntriesOnly::new()),
        Box::new(PagedResults::new(handle.page_size)),
    ];
    let mut search = handle
        .ldap
        .with_timeout(handle.timeout)
        .streaming_search_with(
            adapters,
            base,
            ldap3::Scope::Subtree,
            search_filter,
            NAME_ATTRS.to_vec(),
        )
        .await
        .map_err(|e| classify(e, base))?;

    let mut sent = 0usize;
    while let Some(entry) = search.next().await.map_err(|e| classify(e, base))? {
        let Some(object) = object_from_entry(SearchEntry::construct(entry)) else {
            continue;
        };
        if tx.send(Ok(object)).await.is_err() {
            debug!(base = %base, "Consumer dropped the stream, stopping search");
            return Ok(());
        }
        sent += 1;
    }

    let result = search.finish().await;
    if result.rc == NO_SUCH_OBJECT {
        return Err(Error::NoSuchObject {
            base: base.to_string(),
        });
    }
    result.success()?;

    debug!(base = %base, filter = %search_filter, entries = sent, "Search finished");
    Ok(())
}

/// Map a failed operation, turning `noSuchObject` into a missing scope
fn classify(err: LdapError, base: &str) -> Error {
    match err {
        LdapError::LdapResult { result } if result.rc == NO_SUCH_OBJECT => Error::NoSuchObject {
            base: base.to_string(),
        },
        other => Error::Ldap(other),
    }
}

fn object_from_entry(entry: SearchEntry) -> Option<DirectoryObject> {
    let name = NAME_ATTRS
        .iter()
        .find_map(|attr| entry.attrs.get(*attr).and_then(|values| values.first()))
        .cloned();

    match name {
        Some(name) => Some(DirectoryObject::new(entry.dn, name)),
        None => {
            debug!(dn = %entry.dn, "Entry has no name, skipping");
            None
        }
    }
}
