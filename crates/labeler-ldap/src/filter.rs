//! Server URLs and search filters

use ldap3::ldap_escape;

/// Ports served over TLS from the first byte (LDAPS and the LDAPS global catalog)
const TLS_PORTS: [&str; 2] = [":636", ":3269"];

/// Filter matching every computer object
pub const COMPUTERS: &str = "(objectClass=computer)";

/// Turn a configured server string into an LDAP URL
///
/// Explicit `ldap://` and `ldaps://` URLs are kept. A bare host uses LDAPS
/// when its port is one of the TLS ports, plain LDAP otherwise.
pub fn server_url(server: &str) -> String {
    let lower = server.to_ascii_lowercase();
    if lower.starts_with("ldap://") || lower.starts_with("ldaps://") {
        return server.to_string();
    }
    if TLS_PORTS.iter().any(|port| server.ends_with(port)) {
        format!("ldaps://{}", server)
    } else {
        format!("ldap://{}", server)
    }
}

/// Filter locating a group by its common name
pub fn group_by_name(name: &str) -> String {
    format!("(&(objectClass=group)(cn={}))", ldap_escape(name))
}

/// Filter matching computers that are direct members of `group_dn`
pub fn group_members(group_dn: &str) -> String {
    format!("(&(objectClass=computer)(memberOf={}))", ldap_escape(group_dn))
}
