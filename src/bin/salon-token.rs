//! salon-token - mint a signed bearer token for development and tests.
//!
//! Usage: salon-token <secret> <user-id> [role] [ttl-seconds]

use salond::auth::{TokenClaims, TokenVerifier};
use salon_proto::Role;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (secret, user_id) = match (args.first(), args.get(1)) {
        (Some(s), Some(u)) => (s.clone(), u.clone()),
        _ => {
            eprintln!("usage: salon-token <secret> <user-id> [user|operator] [ttl-seconds]");
            std::process::exit(2);
        }
    };

    let role = match args.get(2).map(String::as_str) {
        Some("operator") => Role::Operator,
        Some("user") | None => Role::User,
        Some(other) => anyhow::bail!("unknown role: {other}"),
    };
    let ttl: i64 = match args.get(3) {
        Some(raw) => raw.parse()?,
        None => 86_400,
    };

    let verifier = TokenVerifier::new(secret.into_bytes());
    let token = verifier.mint(&TokenClaims {
        sub: user_id,
        role,
        exp: chrono::Utc::now().timestamp() + ttl,
    });
    println!("{token}");
    Ok(())
}
