//! Client identification sent with HELLO.

use boltwire_protocol::BoltAgent;

/// Product name and version, e.g. `boltwire/0.1.0`.
pub fn default_user_agent() -> String {
    format!("boltwire/{}", env!("CARGO_PKG_VERSION"))
}

/// Structured agent with the host platform filled in.
pub fn default_bolt_agent() -> BoltAgent {
    BoltAgent::new(default_user_agent())
        .with_platform(format!(
            "{}; {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
        .with_language("Rust")
}
