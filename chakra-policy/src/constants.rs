//! Values baked into the deployed policy programs.
//!
//! Changing any of these changes what the programs accept, and the program
//! sources pin them by content id. Treat them as frozen.

/// The only domain a decryption proof may be signed for.
pub const CANONICAL_DOMAIN: &str = "drive.chakra.network";

/// The only URI a decryption proof may carry.
pub const CANONICAL_URI: &str = "https://drive.chakra.network";

/// Statement the policy programs require on a decryption proof.
pub const DECRYPTION_STATEMENT: &str = "ONLY SIGN THIS MESSAGE IF YOU ARE SIGNING ON drive.chakra.network. DO NOT SIGN THIS MESSAGE IF YOU ARE SIGNING ON ANY OTHER SITE.";

/// Statement used when signing in to the web app.
pub const LOGIN_STATEMENT: &str = "Sign In to Chakra Drive";

/// CAIP-2 style chain id for Solana mainnet.
pub const SOLANA_MAINNET_CHAIN: &str = "solana:mainnet";

/// Oldest `issuedAt` the programs accept, in seconds.
pub const SIWS_MAX_AGE_SECS: i64 = 60 * 60 * 24;

/// `derivedVia` tag on auth signatures produced by a Solana wallet.
pub const SOLANA_SIGN_MESSAGE: &str = "solana.signMessage";

/// Chain tag on every access condition.
pub const SOLANA_CHAIN: &str = "solana";
