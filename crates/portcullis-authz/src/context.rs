//! Per-request state consumed by the resolver.
//!
//! A [`RequestContext`] owns the parts of an inbound request the resolver
//! may read. The body is decoded at most once, on first use by a
//! body-sourced binding, and the decoded form is reused by every later
//! binding of the same request.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};
use mime::Mime;
use portcullis_router::{ParameterLocation, PathParams, SecurityBinding};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::error::{AuthzError, AuthzResult};

/// Maximum number of multipart fields read from one body.
const MAX_MULTIPART_FIELDS: usize = 256;

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// `application/x-www-form-urlencoded` or the text fields of
    /// `multipart/form-data`.
    Form(Vec<(String, String)>),
    /// A JSON object.
    Json(Map<String, Value>),
    /// Empty body or a content type bindings cannot read.
    Opaque,
}

impl DecodedBody {
    /// Values for `name`; JSON values are stringified.
    ///
    /// # Errors
    ///
    /// A JSON field that is present but `null` or an empty array carries no
    /// usable identifier and is rejected as [`AuthzError::BodyDecode`].
    pub fn values(&self, name: &str) -> AuthzResult<Vec<String>> {
        match self {
            Self::Form(pairs) => Ok(pairs
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .collect()),
            Self::Json(object) => match object.get(name) {
                Some(value) => stringify(name, value),
                None => Ok(Vec::new()),
            },
            Self::Opaque => Ok(Vec::new()),
        }
    }
}

/// Scalars and objects become one value; arrays yield one value per element.
fn stringify(name: &str, value: &Value) -> AuthzResult<Vec<String>> {
    match value {
        Value::Null => Err(AuthzError::body_decode(format!("field `{name}` is null"))),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => Ok(vec![value.to_string()]),
        Value::Array(items) if items.is_empty() => Err(AuthzError::body_decode(format!(
            "field `{name}` is an empty array"
        ))),
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(_) => values.push(item.to_string()),
                    other => values.extend(stringify(name, other)?),
                }
            }
            Ok(values)
        }
    }
}

/// The request being authorized.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use http::{HeaderMap, Method, Uri};
/// use portcullis_authz::RequestContext;
///
/// let ctx = RequestContext::new(
///     Method::GET,
///     Uri::from_static("/api/v3/provider/providers?providercodes=AAR&providercodes=BBR"),
///     HeaderMap::new(),
///     Bytes::new(),
/// );
/// assert_eq!(ctx.path(), "/api/v3/provider/providers");
/// assert_eq!(ctx.query_values("providercodes").unwrap(), vec!["AAR", "BBR"]);
/// ```
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    decoded: OnceCell<DecodedBody>,
}

impl RequestContext {
    /// Creates a context; nothing is decoded yet.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            decoded: OnceCell::new(),
        }
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the URI.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns true once the body has been decoded.
    pub fn is_body_decoded(&self) -> bool {
        self.decoded.initialized()
    }

    /// Consumes the context, returning what is needed to forward the request.
    pub fn into_parts(self) -> (Method, Uri, HeaderMap, Bytes) {
        (self.method, self.uri, self.headers, self.body)
    }

    /// All query-string values for `name`, in order.
    pub fn query_values(&self, name: &str) -> AuthzResult<Vec<String>> {
        let Some(query) = self.uri.query() else {
            return Ok(Vec::new());
        };
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| AuthzError::QueryDecode(e.to_string()))?;
        Ok(pairs
            .into_iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v)
            .collect())
    }

    /// Body values for `name`, decoding the body on first use.
    pub async fn body_values(&self, name: &str) -> AuthzResult<Vec<String>> {
        let decoded = self
            .decoded
            .get_or_try_init(|| decode_body(&self.headers, self.body.clone()))
            .await?;
        decoded.values(name)
    }

    /// Resolves the concrete values of the parameter `name` bound by `binding`.
    ///
    /// An absent parameter yields an empty list. A present body field never
    /// does: it yields at least one value or an error.
    pub async fn values_for(
        &self,
        name: &str,
        binding: &SecurityBinding,
        params: &PathParams,
    ) -> AuthzResult<Vec<String>> {
        match binding.location {
            ParameterLocation::Path => Ok(params
                .get(name)
                .map(|v| vec![v.to_string()])
                .unwrap_or_default()),
            ParameterLocation::Query => self.query_values(name),
            ParameterLocation::Body => self.body_values(name).await,
        }
    }
}

async fn decode_body(headers: &HeaderMap, body: Bytes) -> AuthzResult<DecodedBody> {
    let Some(content_type) = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Mime>().ok())
    else {
        return Ok(DecodedBody::Opaque);
    };

    let type_ = content_type.type_();
    let subtype = content_type.subtype();

    if type_ == mime::APPLICATION && subtype == mime::WWW_FORM_URLENCODED {
        serde_urlencoded::from_bytes(&body)
            .map(DecodedBody::Form)
            .map_err(|e| AuthzError::body_decode(e.to_string()))
    } else if type_ == mime::MULTIPART && subtype == mime::FORM_DATA {
        decode_multipart(&content_type, body).await
    } else if type_ == mime::APPLICATION
        && (subtype == mime::JSON || content_type.suffix() == Some(mime::JSON))
    {
        serde_json::from_slice::<Map<String, Value>>(&body)
            .map(DecodedBody::Json)
            .map_err(|e| AuthzError::body_decode(e.to_string()))
    } else {
        Ok(DecodedBody::Opaque)
    }
}

async fn decode_multipart(content_type: &Mime, body: Bytes) -> AuthzResult<DecodedBody> {
    let boundary = content_type
        .get_param(mime::BOUNDARY)
        .ok_or_else(|| AuthzError::body_decode("multipart body without boundary"))?
        .to_string();

    let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = Vec::new();
    let mut count = 0;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AuthzError::body_decode(e.to_string()))?
    {
        count += 1;
        if count > MAX_MULTIPART_FIELDS {
            return Err(AuthzError::body_decode(format!(
                "too many multipart fields (max {MAX_MULTIPART_FIELDS})"
            )));
        }
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| AuthzError::body_decode(e.to_string()))?;
        fields.push((name, value));
    }
    Ok(DecodedBody::Form(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn context(uri: &'static str, content_type: Option<&'static str>, body: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        RequestContext::new(Method::POST, Uri::from_static(uri), headers, Bytes::from_static(body.as_bytes()))
    }

    fn body_binding() -> SecurityBinding {
        SecurityBinding::body("payer", "view").unwrap()
    }

    #[tokio::test]
    async fn test_path_value() {
        let ctx = context("/providers/AAR", None, "");
        let mut params = PathParams::new();
        params.bind("providerCode", "AAR");

        let binding = SecurityBinding::path("provider", "view").unwrap();
        assert_eq!(ctx.values_for("providerCode", &binding, &params).await.unwrap(), vec!["AAR"]);
        assert!(ctx.values_for("other", &binding, &params).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_query_values() {
        let ctx = context("/programs?payerId=1&payerId=2&x=3", None, "");
        let binding = SecurityBinding::query("payer", "view").unwrap();
        let values = ctx.values_for("payerId", &binding, &PathParams::new()).await.unwrap();
        assert_eq!(values, vec!["1", "2"]);
        assert!(ctx.values_for("absent", &binding, &PathParams::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_percent_encoded_query() {
        let ctx = context("/search?name=A%20B&name=c+d", None, "");
        assert_eq!(ctx.query_values("name").unwrap(), vec!["A B", "c d"]);
    }

    #[tokio::test]
    async fn test_form_body() {
        let ctx = context(
            "/programs",
            Some("application/x-www-form-urlencoded"),
            "payerId=123&name=AAR&description=blabla",
        );
        let values = ctx.values_for("payerId", &body_binding(), &PathParams::new()).await.unwrap();
        assert_eq!(values, vec!["123"]);
    }

    #[tokio::test]
    async fn test_json_body_decoded_once() {
        let ctx = context(
            "/programs",
            Some("application/json; charset=utf-8"),
            r#"{"payerId": 123, "providerCode": "AAR", "active": true, "tags": ["a", "b"], "owner": {"id": 1}}"#,
        );
        assert!(!ctx.is_body_decoded());

        assert_eq!(ctx.body_values("payerId").await.unwrap(), vec!["123"]);
        assert!(ctx.is_body_decoded());
        assert_eq!(ctx.body_values("providerCode").await.unwrap(), vec!["AAR"]);
        assert_eq!(ctx.body_values("active").await.unwrap(), vec!["true"]);
        assert_eq!(ctx.body_values("tags").await.unwrap(), vec!["a", "b"]);
        assert_eq!(ctx.body_values("owner").await.unwrap(), vec![r#"{"id":1}"#]);
        assert!(ctx.body_values("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let ctx = context("/programs", Some("application/json"), "{not json");
        let err = ctx.body_values("payerId").await.unwrap_err();
        assert!(matches!(err, AuthzError::BodyDecode(_)));

        let ctx = context("/programs", Some("application/json"), "[1, 2]");
        assert!(ctx.body_values("payerId").await.is_err());
    }

    #[tokio::test]
    async fn test_present_but_empty_json_fields_are_rejected() {
        let ctx = context(
            "/programs",
            Some("application/json"),
            r#"{"none": null, "empty": [], "holes": ["a", null], "nested": [[], "b"]}"#,
        );
        for field in ["none", "empty", "holes"] {
            let err = ctx.body_values(field).await.unwrap_err();
            assert!(matches!(err, AuthzError::BodyDecode(_)), "{field}");
        }
        assert_eq!(ctx.body_values("nested").await.unwrap(), vec!["[]", "b"]);
    }

    #[tokio::test]
    async fn test_vendor_json_content_type() {
        let ctx = context("/programs", Some("application/vnd.api+json"), r#"{"payerId": "7"}"#);
        assert_eq!(ctx.body_values("payerId").await.unwrap(), vec!["7"]);
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"payerId\"\r\n\r\n\
            555\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            payerId=999\r\n\
            --XyZ--\r\n";
        let ctx = context("/programs", Some("multipart/form-data; boundary=XyZ"), body);
        assert_eq!(ctx.body_values("payerId").await.unwrap(), vec!["555"]);
        assert!(ctx.body_values("upload").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_unknown_content_type() {
        let ctx = context("/programs", None, r#"{"payerId": 1}"#);
        assert!(ctx.body_values("payerId").await.unwrap().is_empty());

        let ctx = context("/programs", Some("text/plain"), "payerId=1");
        assert!(ctx.body_values("payerId").await.unwrap().is_empty());
    }
}
