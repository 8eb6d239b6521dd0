use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use vp_dcql::format::sd_jwt;
use vp_dcql::proof::canonicalize;
use vp_dcql::{DataIntegritySigner, Ed25519Keyring, Signature, Signer};

const DEGREE: &[u8] = include_bytes!("../data/degree-credential.json");
const EMPLOYEE: &[u8] = include_bytes!("../data/employee-credential.json");
const PID: &[u8] = include_bytes!("../data/pid-claims.json");

pub const PID_VCT: &str = "https://credentials.example.com/identity_credential";

// PID claims issued as disclosures; everything else is always visible
const PID_DISCLOSABLE: [&str; 4] = ["given_name", "family_name", "birthdate", "address"];

#[derive(Clone, Debug)]
pub struct Issuer {
    keyring: Ed25519Keyring,
}

impl Default for Issuer {
    fn default() -> Self {
        Self::new()
    }
}

impl Issuer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyring: Ed25519Keyring::from_seed(&[42; 32]),
        }
    }

    #[must_use]
    pub fn did(&self) -> String {
        self.keyring.did()
    }

    /// `ExampleDegree` credential as `ldp_vc`.
    #[must_use]
    pub fn degree(&self) -> String {
        self.ldp_vc(&load(DEGREE))
    }

    /// `ExampleDegree` credential as `jwt_vc_json`.
    #[must_use]
    pub fn degree_jwt(&self) -> String {
        self.jwt_vc(&load(DEGREE))
    }

    /// `EmployeeIDCredential` as `ldp_vc`.
    #[must_use]
    pub fn employee(&self) -> String {
        self.ldp_vc(&load(EMPLOYEE))
    }

    /// Person identification data as `dc+sd-jwt`.
    #[must_use]
    pub fn pid(&self) -> String {
        self.sd_jwt(PID_VCT, &load(PID), &PID_DISCLOSABLE)
    }

    /// Set the issuer and secure the credential with an embedded proof.
    #[must_use]
    pub fn ldp_vc(&self, credential: &Value) -> String {
        let mut document = with_issuer(credential, &self.did());

        let signer = DataIntegritySigner::new(self.keyring.clone());
        let unsigned = canonicalize(&document).expect("should canonicalize");
        let proof = signer.sign(unsigned.as_bytes(), None).expect("should sign");
        document.insert("proof".to_string(), proof);

        Value::Object(document).to_string()
    }

    /// Set the issuer and secure the credential as a JWT.
    #[must_use]
    pub fn jwt_vc(&self, credential: &Value) -> String {
        let vc = with_issuer(credential, &self.did());
        let header = json!({
            "alg": "EdDSA",
            "typ": "JWT",
            "kid": self.keyring.verification_method(),
        });
        let payload = json!({
            "iss": self.did(),
            "iat": chrono::Utc::now().timestamp(),
            "vc": vc,
        });
        self.sign_jwt(&header, &payload)
    }

    /// Issue an SD-JWT VC with each top-level claim named in `disclosable`
    /// selectively disclosable.
    #[must_use]
    pub fn sd_jwt(&self, vct: &str, claims: &Value, disclosable: &[&str]) -> String {
        let mut payload = Map::new();
        payload.insert("iss".to_string(), json!(self.did()));
        payload.insert("iat".to_string(), json!(chrono::Utc::now().timestamp()));
        payload.insert("vct".to_string(), json!(vct));
        payload.insert("_sd_alg".to_string(), json!("sha-256"));

        let mut digests = vec![];
        let mut disclosures = vec![];
        for (name, value) in claims.as_object().expect("claims should be an object") {
            if !disclosable.contains(&name.as_str()) {
                payload.insert(name.clone(), value.clone());
                continue;
            }
            let salt = Sha256::digest(format!("{vct}:{name}").as_bytes());
            let salt = Base64UrlUnpadded::encode_string(&salt[..16]);
            let disclosure = json!([salt, name, value]).to_string();
            let encoded = Base64UrlUnpadded::encode_string(disclosure.as_bytes());
            digests.push(sd_jwt::digest(&encoded));
            disclosures.push(encoded);
        }
        payload.insert("_sd".to_string(), json!(digests));

        let header = json!({
            "alg": "EdDSA",
            "typ": "dc+sd-jwt",
            "kid": self.keyring.verification_method(),
        });
        let mut compact = format!("{}~", self.sign_jwt(&header, &Value::Object(payload)));
        for disclosure in disclosures {
            compact.push_str(&disclosure);
            compact.push('~');
        }
        compact
    }

    fn sign_jwt(&self, header: &Value, payload: &Value) -> String {
        let header = Base64UrlUnpadded::encode_string(header.to_string().as_bytes());
        let payload = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        let signing_input = format!("{header}.{payload}");
        let signature = self.keyring.try_sign(signing_input.as_bytes()).expect("should sign");
        format!("{signing_input}.{}", Base64UrlUnpadded::encode_string(&signature))
    }
}

#[must_use]
pub fn load(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("should deserialize")
}

// insert `issuer` after `type`, keeping member order
fn with_issuer(credential: &Value, issuer: &str) -> Map<String, Value> {
    let mut document = Map::new();
    for (name, value) in credential.as_object().expect("credential should be an object") {
        document.insert(name.clone(), value.clone());
        if name == "type" {
            document.insert("issuer".to_string(), json!(issuer));
        }
    }
    document
}
