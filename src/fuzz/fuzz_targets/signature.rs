#![no_main]
use {
    arbitrary::Arbitrary,
    bytes::Bytes,
    hmac_request_auth::{sign_request, verify_request, AuthError, SecretKey, VerifierConfig},
    http::{Method, Request, Uri},
    http_body_util::Full,
    libfuzzer_sys::{fuzz_target, Corpus},
    tokio::runtime::Builder as RuntimeBuilder,
    tower::BoxError,
};

const SECRET: &str = "s3cr3t-key-of-32-bytes-minimum12";

#[derive(Arbitrary, Debug)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Patch => Method::PATCH,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct VerifyInput {
    method: HttpMethod,
    uri: String,
    body: Vec<u8>,
    signature: Option<Vec<u8>>,
    allow_unsigned_empty: bool,
}

fuzz_target!(|data: VerifyInput| -> Corpus {
    let result = run_target(data);
    result.map(|_| Corpus::Keep).unwrap_or(Corpus::Reject)
});

fn run_target(data: VerifyInput) -> Result<(), BoxError> {
    let config = VerifierConfig::builder().secret(SECRET).allow_unsigned_empty(data.allow_unsigned_empty).build()?;
    let uri = Uri::from_maybe_shared(data.uri)?;
    let method: Method = data.method.into();
    let body = Bytes::from(data.body);

    let mut signed = Request::builder().method(method.clone()).uri(uri.clone()).body(body.clone())?;
    sign_request(&mut signed, &SecretKey::from(SECRET));

    let mut arbitrary = Request::builder().method(method).uri(uri).body(Full::new(body))?;
    if let Some(signature) = data.signature {
        arbitrary.headers_mut().insert("x-signature", signature.try_into()?);
    }

    let rt = RuntimeBuilder::new_current_thread().enable_all().build()?;
    rt.block_on(async move {
        // Whatever the client signs, the verifier must accept.
        if let Err(e) = verify_request(signed.map(Full::new), &config).await {
            panic!("verifier rejected a signed request: {}", e);
        }

        match verify_request(arbitrary, &config).await {
            Ok(_) | Err(AuthError::MissingSignature) | Err(AuthError::SignatureMismatch) => Ok(()),
            Err(e) => panic!("unexpected error: {}", e),
        }
    })
}
