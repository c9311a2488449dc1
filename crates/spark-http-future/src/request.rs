//! 请求目标解析与 HTTP/1.0 请求序列化。

use spark_future::FutureError;
use url::{Host, Url, form_urlencoded};

/// 从 URI 中解析出的连接目标。
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Target {
    /// 用于地址解析的主机名或 IP 字面量（IPv6 不带方括号）。
    pub(crate) host: String,
    pub(crate) port: u16,
    /// 请求行中的路径，含原始查询串。
    pub(crate) path: String,
    /// `Host` 头值；端口非 80 时带 `:port`。
    pub(crate) host_header: String,
}

impl Target {
    pub(crate) fn parse(uri: &str) -> Result<Self, FutureError> {
        let invalid = |detail: String| FutureError::InvalidRequest { detail };
        let url = Url::parse(uri).map_err(|err| invalid(format!("`{uri}`: {err}")))?;
        if url.scheme() != "http" {
            return Err(invalid(format!(
                "unsupported scheme `{}`, only plain `http` is available",
                url.scheme()
            )));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid(format!("`{uri}` has no host"))),
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let mut path = url.path().to_owned();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        let bracketed = url.host_str().unwrap_or(&host).to_owned();
        let host_header = if port == 80 {
            bracketed
        } else {
            format!("{bracketed}:{port}")
        };
        Ok(Self {
            host,
            port,
            path,
            host_header,
        })
    }

    pub(crate) fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 请求正文。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum Body {
    #[default]
    Empty,
    /// 键值对：`GET` 时拼入查询串，其余方法时作为表单正文。
    Form(Vec<(String, String)>),
    Raw(Vec<u8>),
}

/// 尚未序列化的请求描述。
#[derive(Clone, Debug)]
pub(crate) struct RequestParts {
    pub(crate) method: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

impl Default for RequestParts {
    fn default() -> Self {
        Self {
            method: String::from("GET"),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }
}

impl RequestParts {
    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// 按 HTTP/1.0 帧格式序列化完整请求。
    ///
    /// `Content-Length` 总是由正文实际长度决定，调用方设置的同名头被忽略；
    /// `User-Agent` 与 `Host` 仅在调用方未设置时补齐。
    pub(crate) fn serialize(&self, target: &Target, user_agent: &str) -> Vec<u8> {
        let is_get = self.method.eq_ignore_ascii_case("GET");
        let mut path = target.path.clone();
        let mut content_type = None;
        let body: Vec<u8> = match &self.body {
            Body::Empty => Vec::new(),
            Body::Form(fields) if is_get => {
                if !fields.is_empty() {
                    path.push(if path.contains('?') { '&' } else { '?' });
                    path.push_str(&encode_form(fields));
                }
                Vec::new()
            }
            Body::Form(fields) => {
                content_type = Some("application/x-www-form-urlencoded");
                encode_form(fields).into_bytes()
            }
            Body::Raw(raw) => raw.clone(),
        };

        let mut head = format!("{} {} HTTP/1.0\r\n", self.method, path);
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if let Some(content_type) = content_type
            && !self.has_header("Content-Type")
        {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        if !self.has_header("User-Agent") {
            head.push_str(&format!("User-Agent: {user_agent}\r\n"));
        }
        if !self.has_header("Host") {
            head.push_str(&format!("Host: {}\r\n", target.host_header));
        }
        head.push_str("\r\n");

        let mut request = head.into_bytes();
        request.extend_from_slice(&body);
        request
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(method: &str, body: Body) -> RequestParts {
        RequestParts {
            method: method.into(),
            headers: Vec::new(),
            body,
        }
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parses_targets_with_and_without_ports() {
        let target = Target::parse("http://example.com/a/b?x=1").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
        assert_eq!(target.path, "/a/b?x=1");
        assert_eq!(target.host_header, "example.com");

        let target = Target::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(target.path, "/");
        assert_eq!(target.host_header, "127.0.0.1:8080");
        assert_eq!(target.peer(), "127.0.0.1:8080");

        let target = Target::parse("http://[::1]:81/").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.host_header, "[::1]:81");
    }

    #[test]
    fn rejects_unusable_uris() {
        for uri in ["https://example.com/", "ftp://example.com/", "not a uri", "http:///"] {
            assert!(
                matches!(Target::parse(uri), Err(FutureError::InvalidRequest { .. })),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn get_form_fields_extend_the_query() {
        let target = Target::parse("http://example.com/search?q=1").unwrap();
        let request = parts("GET", Body::Form(pairs(&[("page", "2"), ("tag", "a b")])))
            .serialize(&target, "ua/1");
        let text = String::from_utf8(request).unwrap();
        assert_eq!(
            text,
            "GET /search?q=1&page=2&tag=a+b HTTP/1.0\r\n\
             Content-Length: 0\r\n\
             User-Agent: ua/1\r\n\
             Host: example.com\r\n\
             \r\n"
        );
    }

    #[test]
    fn post_form_becomes_an_encoded_body() {
        let target = Target::parse("http://example.com:8080/submit").unwrap();
        let request = parts("POST", Body::Form(pairs(&[("name", "spark & co")])))
            .serialize(&target, "ua/1");
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("POST /submit HTTP/1.0\r\n"));
        assert!(text.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        assert!(text.contains("Host: example.com:8080\r\n"));
        assert!(text.ends_with("\r\n\r\nname=spark+%26+co"));
    }

    #[test]
    fn caller_headers_override_defaults_but_not_content_length() {
        let target = Target::parse("http://example.com/").unwrap();
        let mut request = parts("PUT", Body::Raw(b"abc".to_vec()));
        request.headers = pairs(&[
            ("user-agent", "custom"),
            ("Host", "virtual.example"),
            ("Content-Length", "999"),
        ]);
        let text = String::from_utf8(request.serialize(&target, "ua/1")).unwrap();
        assert!(text.contains("user-agent: custom\r\n"));
        assert!(!text.contains("ua/1"));
        assert!(text.contains("Host: virtual.example\r\n"));
        assert!(!text.contains("Host: example.com"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(!text.contains("999"));
    }
}
