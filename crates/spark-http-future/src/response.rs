use std::borrow::Cow;

use bytes::Bytes;
use spark_future::{FutureError, FutureResult};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// 解析后的 HTTP 响应。
///
/// 正文是响应头之后直到连接关闭的全部字节；HTTP/1.0 下不依据 `Content-Length` 截断。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    expected: Vec<u16>,
}

impl HttpResponse {
    /// 按名称（不区分大小写）查找第一个匹配的头。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// 状态码是否落在期望集合之外；未显式设置期望时以 2xx 为成功。
    pub fn is_error(&self) -> bool {
        if self.expected.is_empty() {
            !(200..300).contains(&self.status)
        } else {
            !self.expected.contains(&self.status)
        }
    }

    /// 解析原始响应字节。
    pub(crate) fn parse(raw: &[u8], expected: &[u16]) -> FutureResult<Self> {
        let malformed = |detail: String| FutureError::MalformedResponse { detail };
        if raw.is_empty() {
            return Err(malformed("peer closed without sending a response".into()));
        }
        let split = raw
            .windows(HEADER_TERMINATOR.len())
            .position(|window| window == HEADER_TERMINATOR)
            .ok_or_else(|| malformed("missing header terminator".into()))?;
        let head = std::str::from_utf8(&raw[..split])
            .map_err(|_| malformed("response head is not valid UTF-8".into()))?;

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let (status, reason) = parse_status_line(status_line)
            .ok_or_else(|| malformed(format!("bad status line {status_line:?}")))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("bad header line {line:?}")))?;
            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self {
            status,
            reason: reason.to_owned(),
            headers,
            body: Bytes::copy_from_slice(&raw[split + HEADER_TERMINATOR.len()..]),
            expected: expected.to_vec(),
        })
    }
}

fn parse_status_line(line: &str) -> Option<(u16, &str)> {
    let (version, rest) = line.split_once(' ')?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((code.parse().ok()?, reason.trim()))
}
