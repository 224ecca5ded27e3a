use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Resolves `host` and rejects it if any answer lands in a blocked range.
///
/// Blocked: loopback, RFC1918 private, link-local, unique-local, multicast,
/// the literal `localhost`, and the cloud-metadata address `169.254.169.254`.
pub async fn screen_host(host: &str) -> Result<(), String> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err("host is localhost".to_string());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return screen_ip(ip);
    }

    let lookup_target = format!("{host}:0");
    let addrs = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| format!("dns resolution failed: {e}"))?;

    let mut any = false;
    for addr in addrs {
        any = true;
        screen_ip(addr.ip())?;
    }

    if !any {
        return Err("host did not resolve to any address".to_string());
    }

    Ok(())
}

/// Synchronous check used for redirect re-validation and already-resolved IPs.
pub fn screen_ip(ip: IpAddr) -> Result<(), String> {
    match ip {
        IpAddr::V4(v4) => screen_ipv4(v4),
        IpAddr::V6(v6) => screen_ipv6(v6),
    }
}

fn screen_ipv4(ip: Ipv4Addr) -> Result<(), String> {
    if ip == Ipv4Addr::new(169, 254, 169, 254) {
        return Err("cloud metadata address".to_string());
    }
    if ip.is_loopback() {
        return Err("loopback address".to_string());
    }
    if ip.is_private() {
        return Err("private (rfc1918) address".to_string());
    }
    if ip.is_link_local() {
        return Err("link-local address".to_string());
    }
    if ip.is_multicast() {
        return Err("multicast address".to_string());
    }
    if ip.is_broadcast() || ip.is_unspecified() || ip.is_documentation() {
        return Err("reserved address".to_string());
    }
    Ok(())
}

fn screen_ipv6(ip: Ipv6Addr) -> Result<(), String> {
    if ip == Ipv6Addr::LOCALHOST {
        return Err("loopback address".to_string());
    }
    if ip.is_multicast() {
        return Err("multicast address".to_string());
    }
    if ip.is_unspecified() {
        return Err("unspecified address".to_string());
    }
    if is_unique_local(&ip) {
        return Err("unique-local address".to_string());
    }
    if is_link_local_v6(&ip) {
        return Err("link-local address".to_string());
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return screen_ipv4(v4);
    }
    Ok(())
}

/// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10
fn is_link_local_v6(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_v4() {
        assert!(screen_ip("127.0.0.1".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_private_v4() {
        assert!(screen_ip("10.0.0.5".parse().unwrap()).is_err());
        assert!(screen_ip("172.16.0.5".parse().unwrap()).is_err());
        assert!(screen_ip("192.168.1.5".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_link_local_v4() {
        assert!(screen_ip("169.254.1.1".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_cloud_metadata() {
        assert!(screen_ip("169.254.169.254".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_loopback_v6() {
        assert!(screen_ip("::1".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_unique_local_v6() {
        assert!(screen_ip("fc00::1".parse().unwrap()).is_err());
        assert!(screen_ip("fd12:3456:789a::1".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_link_local_v6() {
        assert!(screen_ip("fe80::1".parse().unwrap()).is_err());
    }

    #[test]
    fn allows_public_v4() {
        assert!(screen_ip("93.184.216.34".parse().unwrap()).is_ok());
    }

    #[test]
    fn allows_public_v6() {
        assert!(screen_ip("2606:2800:220:1:248:1893:25c8:1946".parse().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn rejects_localhost_literal() {
        assert!(screen_host("localhost").await.is_err());
    }
}
