//! Small helpers for emitting Terraform (HCL) text.

use std::sync::OnceLock;

use regex::Regex;

use topo_model::{Network, Router};

fn invalid_identifier_chars() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").ok())
        .as_ref()
}

/// Terraform identifier for a topology name. Characters outside
/// `[A-Za-z0-9_]` become `_`; a leading digit gets a `_` prefix.
pub fn identifier(name: &str) -> String {
    let replaced = match invalid_identifier_chars() {
        Some(re) => re.replace_all(name, "_").into_owned(),
        None => name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect(),
    };
    if replaced.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", replaced)
    } else {
        replaced
    }
}

/// Quoted HCL string literal. Template sequences are escaped so names are
/// never interpolated.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quoted string, or `null`.
pub fn quote_opt(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), quote)
}

/// `["a", "b"]`
pub fn string_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let items: Vec<String> = values.into_iter().map(quote).collect();
    format!("[{}]", items.join(", "))
}

/// Network list argument of the network module, in declaration order.
pub fn network_list(networks: &[Network]) -> String {
    if networks.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::from("[\n");
    for network in networks {
        let pool: Vec<String> = network
            .pool
            .iter()
            .map(|p| format!("{{ start = {}, end = {} }}", quote(&p.start), quote(&p.end)))
            .collect();
        out.push_str(&format!(
            r#"    {{
      name        = {name}
      cidr        = {cidr}
      gateway_ip  = {gateway}
      enable_dhcp = {dhcp}
      pool        = [{pool}]
    }},
"#,
            name = quote(&network.name),
            cidr = quote(&network.cidr),
            gateway = quote_opt(network.gateway_ip.as_deref()),
            dhcp = network.enable_dhcp,
            pool = pool.join(", "),
        ));
    }
    out.push_str("  ]");
    out
}

/// Router list argument of the network module, in declaration order.
pub fn router_list(routers: &[Router], include_routes: bool) -> String {
    if routers.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::from("[\n");
    for router in routers {
        let interfaces: Vec<String> = router
            .networks
            .iter()
            .map(|a| format!("{{ network = {}, ip = {} }}", quote(&a.network_name), quote(&a.ip)))
            .collect();
        let routes: Vec<String> = if include_routes {
            router
                .routes
                .iter()
                .map(|r| {
                    format!(
                        "{{ destination = {}, nexthop = {} }}",
                        quote(&r.destination),
                        quote(&r.nexthop)
                    )
                })
                .collect()
        } else {
            Vec::new()
        };
        out.push_str(&format!(
            r#"    {{
      name       = {name}
      external   = {external}
      interfaces = [{interfaces}]
      routes     = [{routes}]
    }},
"#,
            name = quote(&router.name),
            external = router.external,
            interfaces = interfaces.join(", "),
            routes = routes.join(", "),
        ));
    }
    out.push_str("  ]");
    out
}
