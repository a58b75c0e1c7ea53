use crate::application_port::{CodecError, TokenCodec};
use crate::domain_model::{FamilyId, SubjectId, TokenClaims, TokenKind};
use crate::domain_port::Clock;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub issuer: String,
    pub audience: String,
    /// Slack accepted past the expiry boundary.
    pub leeway_secs: u64,
    /// Key used for signing. Retired keys stay in `keys` so tokens they
    /// signed keep verifying until they expire.
    pub active_key_id: String,
    pub keys: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    scp: Vec<String>,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    fid: String,
    jti: String,
    typ: TokenKind,
}

fn encode_claims(claims: &TokenClaims, cfg: &CodecConfig) -> Result<String, CodecError> {
    if !claims.is_well_formed() {
        return Err(CodecError::Encoding(
            "claims failed schema validation".to_string(),
        ));
    }
    let key = cfg
        .keys
        .get(&cfg.active_key_id)
        .ok_or_else(|| CodecError::Encoding("active signing key not configured".to_string()))?;

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(cfg.active_key_id.clone());

    let wire = WireClaims {
        sub: claims.subject_id.to_string(),
        scp: claims.scopes.iter().cloned().collect(),
        exp: claims.expires_at.timestamp(),
        iat: claims.issued_at.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        fid: claims.family_id.to_string(),
        jti: claims.jti.clone(),
        typ: claims.kind,
    };

    encode(&header, &wire, &EncodingKey::from_secret(key))
        .map_err(|e| CodecError::Encoding(e.to_string()))
}

fn decode_claims(token: &str, cfg: &CodecConfig) -> Result<WireClaims, CodecError> {
    let header = decode_header(token).map_err(|_| CodecError::Malformed)?;
    let kid = header.kid.ok_or(CodecError::Malformed)?;
    let key = cfg.keys.get(&kid).ok_or(CodecError::SignatureInvalid)?;

    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked against the injected clock below, not the
    // library's ambient system time.
    validation.validate_exp = false;
    validation.set_audience(&[cfg.audience.clone()]);
    validation.set_issuer(&[cfg.issuer.clone()]);

    let data = decode::<WireClaims>(token, &DecodingKey::from_secret(key), &validation).map_err(
        |e| match e.kind() {
            ErrorKind::InvalidSignature => CodecError::SignatureInvalid,
            _ => CodecError::Malformed,
        },
    )?;
    Ok(data.claims)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, CodecError> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(CodecError::Malformed)
}

/// HS256 JWT codec. Verification is pure computation; the family store is
/// never consulted here.
pub struct JwtCodec {
    cfg: CodecConfig,
    clock: Arc<dyn Clock>,
}

impl JwtCodec {
    pub fn new(cfg: CodecConfig, clock: Arc<dyn Clock>) -> Self {
        JwtCodec { cfg, clock }
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtCodec {
    async fn issue(&self, claims: &TokenClaims) -> Result<String, CodecError> {
        encode_claims(claims, &self.cfg)
    }

    async fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, CodecError> {
        let wire = decode_claims(token, &self.cfg)?;
        if wire.typ != expected {
            return Err(CodecError::Malformed);
        }

        let subject_id = wire.sub.parse::<SubjectId>().map_err(|_| CodecError::Malformed)?;
        let family_id = wire.fid.parse::<FamilyId>().map_err(|_| CodecError::Malformed)?;
        let issued_at = timestamp(wire.iat)?;
        let expires_at = timestamp(wire.exp)?;

        let deadline = expires_at + Duration::seconds(self.cfg.leeway_secs as i64);
        if self.clock.now() >= deadline {
            return Err(CodecError::Expired);
        }

        Ok(TokenClaims {
            subject_id,
            scopes: wire.scp.into_iter().collect(),
            issued_at,
            expires_at,
            family_id,
            kind: wire.typ,
            jti: wire.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_port::ManualClock;
    use std::collections::BTreeSet;

    fn config() -> CodecConfig {
        CodecConfig {
            issuer: "tessera.test".to_string(),
            audience: "api".to_string(),
            leeway_secs: 30,
            active_key_id: "k1".to_string(),
            keys: HashMap::from([("k1".to_string(), b"test-secret".to_vec())]),
        }
    }

    fn claims(now: DateTime<Utc>, kind: TokenKind, ttl_secs: i64) -> TokenClaims {
        TokenClaims {
            subject_id: SubjectId(uuid::Uuid::new_v4()),
            scopes: BTreeSet::from(["chat.read".to_string(), "chat.write".to_string()]),
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            family_id: FamilyId::generate(),
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn codec_at(now: DateTime<Utc>) -> (JwtCodec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (JwtCodec::new(config(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn round_trip_preserves_claims() {
        let now = Utc::now();
        let (codec, _) = codec_at(now);
        let claims = claims(now, TokenKind::Access, 900);

        let token = codec.issue(&claims).await.unwrap();
        let decoded = codec.verify(&token, TokenKind::Access).await.unwrap();

        assert_eq!(decoded.subject_id, claims.subject_id);
        assert_eq!(decoded.scopes, claims.scopes);
        assert_eq!(decoded.family_id, claims.family_id);
        assert_eq!(decoded.jti, claims.jti);
        assert_eq!(decoded.kind, TokenKind::Access);
        // second resolution survives the wire format
        assert_eq!(decoded.issued_at.timestamp(), claims.issued_at.timestamp());
        assert_eq!(
            decoded.expires_at.timestamp(),
            claims.expires_at.timestamp()
        );
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let now = Utc::now();
        let (codec, _) = codec_at(now);
        let token = codec
            .issue(&claims(now, TokenKind::Access, 900))
            .await
            .unwrap();

        let (payload, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { "B" } else { "A" };
        let mut tampered = signature.to_string();
        tampered.replace_range(..1, flipped);
        let tampered = format!("{}.{}", payload, tampered);

        match codec.verify(&tampered, TokenKind::Access).await {
            Err(CodecError::SignatureInvalid) => {}
            other => panic!("expected SignatureInvalid, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn expiry_honors_leeway_boundary() {
        let now = Utc::now();
        let (codec, clock) = codec_at(now);
        let token = codec
            .issue(&claims(now, TokenKind::Access, 900))
            .await
            .unwrap();

        // just past expiry but inside leeway
        clock.set(now + Duration::seconds(900 + 10));
        assert!(codec.verify(&token, TokenKind::Access).await.is_ok());

        // past expiry plus leeway
        clock.set(now + Duration::seconds(900 + 31));
        match codec.verify(&token, TokenKind::Access).await {
            Err(CodecError::Expired) => {}
            other => panic!("expected Expired, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn wrong_kind_is_malformed() {
        let now = Utc::now();
        let (codec, _) = codec_at(now);
        let token = codec
            .issue(&claims(now, TokenKind::Refresh, 3600))
            .await
            .unwrap();

        match codec.verify(&token, TokenKind::Access).await {
            Err(CodecError::Malformed) => {}
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (codec, _) = codec_at(Utc::now());
        match codec.verify("not-a-token", TokenKind::Access).await {
            Err(CodecError::Malformed) => {}
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn unknown_key_id_is_rejected() {
        let now = Utc::now();
        let (signer, _) = codec_at(now);
        let token = signer
            .issue(&claims(now, TokenKind::Access, 900))
            .await
            .unwrap();

        let mut cfg = config();
        cfg.active_key_id = "k2".to_string();
        cfg.keys = HashMap::from([("k2".to_string(), b"other-secret".to_vec())]);
        let verifier = JwtCodec::new(cfg, Arc::new(ManualClock::new(now)));

        match verifier.verify(&token, TokenKind::Access).await {
            Err(CodecError::SignatureInvalid) => {}
            other => panic!("expected SignatureInvalid, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn retired_key_keeps_verifying() {
        let now = Utc::now();
        let (old_signer, _) = codec_at(now);
        let token = old_signer
            .issue(&claims(now, TokenKind::Access, 900))
            .await
            .unwrap();

        // rotated config: k2 signs, k1 retired but still present
        let mut cfg = config();
        cfg.active_key_id = "k2".to_string();
        cfg.keys
            .insert("k2".to_string(), b"next-secret".to_vec());
        let rotated = JwtCodec::new(cfg, Arc::new(ManualClock::new(now)));

        assert!(rotated.verify(&token, TokenKind::Access).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_claims_refuse_to_encode() {
        let now = Utc::now();
        let (codec, _) = codec_at(now);

        let mut nil_subject = claims(now, TokenKind::Access, 900);
        nil_subject.subject_id = SubjectId(uuid::Uuid::nil());
        assert!(matches!(
            codec.issue(&nil_subject).await,
            Err(CodecError::Encoding(_))
        ));

        let mut inverted = claims(now, TokenKind::Access, 900);
        inverted.expires_at = inverted.issued_at - Duration::seconds(1);
        assert!(matches!(
            codec.issue(&inverted).await,
            Err(CodecError::Encoding(_))
        ));
    }
}
