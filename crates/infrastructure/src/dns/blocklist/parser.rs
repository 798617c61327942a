use rustc_hash::FxHashSet;

/// Hostnames that appear in virtually every hosts file and must never be
/// treated as blocked domains.
const HOSTS_BOILERPLATE: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// Parse one downloaded blocklist into a set of lowercased domains.
///
/// Format is detected per line:
/// - hosts file: `IP domain [domain...]`, comments after `#`
/// - plain domain-per-line
/// - adblock: `||domain^`; cosmetic/element-hiding and exception rules are
///   ignored
pub fn parse_blocklist(body: &str) -> FxHashSet<String> {
    let mut domains = FxHashSet::default();
    for line in body.lines() {
        parse_line(line, &mut domains);
    }
    domains
}

fn parse_line(line: &str, domains: &mut FxHashSet<String>) {
    let line = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with("@@") {
        return;
    }

    // Adblock-style ||domain^ rules: only the literal domain portion counts.
    if let Some(rest) = line.strip_prefix("||") {
        let end = rest
            .find(|c| matches!(c, '^' | '/' | '$' | '*'))
            .unwrap_or(rest.len());
        add_domain(&rest[..end], domains);
        return;
    }
    // Other adblock syntax (cosmetic rules, element hiding) is ignored.
    if line.contains("##") || line.contains("#@#") || line.starts_with('|') {
        return;
    }

    let mut tokens = line.split_whitespace();
    let first = match tokens.next() {
        Some(t) => t,
        None => return,
    };

    if first.parse::<std::net::IpAddr>().is_ok() {
        // hosts format: every remaining token is a hostname
        for token in tokens {
            add_domain(token, domains);
        }
    } else {
        add_domain(first, domains);
    }
}

fn add_domain(raw: &str, domains: &mut FxHashSet<String>) {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty()
        || domain.contains('/')
        || domain.contains(':')
        || HOSTS_BOILERPLATE.contains(&domain.as_str())
    {
        return;
    }
    domains.insert(domain);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hosts_format() {
        let body = "\
# comment
127.0.0.1 localhost
0.0.0.0 ads.example.com tracker.example.com
0.0.0.0 Metrics.Example.NET # inline comment
";
        let set = parse_blocklist(body);
        assert!(set.contains("ads.example.com"));
        assert!(set.contains("tracker.example.com"));
        assert!(set.contains("metrics.example.net"));
        assert!(!set.contains("localhost"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn parses_plain_domains() {
        let set = parse_blocklist("ads.example.com\n\ntelemetry.example.org.\n");
        assert!(set.contains("ads.example.com"));
        assert!(set.contains("telemetry.example.org"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn parses_adblock_rules() {
        let body = "\
! adblock comment
||ads.example.com^
||tracker.example.net^$third-party
@@||allowed.example.com^
example.com##.ad-banner
";
        let set = parse_blocklist(body);
        assert!(set.contains("ads.example.com"));
        assert!(set.contains("tracker.example.net"));
        assert!(!set.contains("allowed.example.com"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn mixed_formats_union() {
        let body = "0.0.0.0 a.example.com\nb.example.com\n||c.example.com^\n";
        let set = parse_blocklist(body);
        assert_eq!(set.len(), 3);
    }
}
