use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::io::{self, Read};

use html5ever::tendril::fmt::UTF8;
use html5ever::tendril::stream::Utf8LossyDecoder;
use html5ever::tendril::{ByteTendril, StrTendril, TendrilSink};
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Doctype, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
};
use html5ever::TokenizerResult;
use reqwest::Url;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

use crate::data_models::{HTML_VERSION_UNKNOWN, Link, ParsedPage};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("reading html stream failed: {0}")]
    Read(#[from] io::Error),
    #[error("html extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Maps a doctype to a coarse HTML version label.
///
/// No public identifier means the modern `<!DOCTYPE html>`. Otherwise the
/// identifier is matched most specific first.
pub fn detect_html_version(doctype: &Doctype) -> &'static str {
    let Some(public_id) = doctype.public_id.as_ref() else {
        return "HTML5";
    };
    let id = public_id.to_lowercase();
    if id.contains("xhtml 1.1") || id.contains("xhtml basic 1.1") {
        "XHTML 1.1"
    } else if id.contains("xhtml 1.0") {
        "XHTML 1.0"
    } else if id.contains("html 4.01") {
        "HTML 4.01"
    } else {
        HTML_VERSION_UNKNOWN
    }
}

/// Resolves `href` against `base` and keeps it only when it is http(s).
pub fn classify_link(base: &Url, href: &str) -> Option<Link> {
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    // host and explicit port, like an authority compare; default ports are
    // already dropped by the parser
    let is_internal = match (resolved.host_str(), base.host_str()) {
        (Some(host), Some(base_host)) => {
            host.eq_ignore_ascii_case(base_host) && resolved.port() == base.port()
        }
        _ => false,
    };
    Some(Link {
        url: resolved.into(),
        is_internal,
    })
}

enum TitleState {
    Pending,
    Capturing(String),
    Done,
}

/// Token sink that records page facts as tokens stream past.
struct PageSink {
    base: Url,
    page: RefCell<ParsedPage>,
    title: RefCell<TitleState>,
    saw_doctype: Cell<bool>,
}

impl PageSink {
    fn new(base: Url) -> Self {
        Self {
            base,
            page: RefCell::new(ParsedPage::default()),
            title: RefCell::new(TitleState::Pending),
            saw_doctype: Cell::new(false),
        }
    }

    fn start_tag(&self, tag: &Tag) -> TokenSinkResult<()> {
        let name: &str = &tag.name;
        match name {
            "title" => {
                let mut title = self.title.borrow_mut();
                if matches!(*title, TitleState::Pending) {
                    *title = TitleState::Capturing(String::new());
                }
            }
            "a" => {
                if let Some(link) = attr(tag, "href").and_then(|href| classify_link(&self.base, href))
                {
                    self.page.borrow_mut().links.push(link);
                }
            }
            "input" => {
                if attr(tag, "type").is_some_and(|t| t.eq_ignore_ascii_case("password")) {
                    self.page.borrow_mut().has_login_form = true;
                }
            }
            _ => {
                self.page.borrow_mut().headings.increment(name);
            }
        }

        // The tokenizer has no tree builder behind it, so it must be told
        // which elements hold raw text.
        match name {
            "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "plaintext" => TokenSinkResult::Plaintext,
            _ => TokenSinkResult::Continue,
        }
    }

    fn end_tag(&self, tag: &Tag) {
        if &*tag.name == "title" {
            self.finish_title();
        }
    }

    fn finish_title(&self) {
        let mut title = self.title.borrow_mut();
        if let TitleState::Capturing(text) = &*title {
            self.page.borrow_mut().title = text.trim().to_string();
            *title = TitleState::Done;
        }
    }

    fn text(&self, text: &str) {
        if let TitleState::Capturing(buf) = &mut *self.title.borrow_mut() {
            buf.push_str(text);
        }
    }

    fn doctype(&self, doctype: &Doctype) {
        // later doctypes are parse errors and do not change the mode
        if !self.saw_doctype.replace(true) {
            self.page.borrow_mut().html_version = detect_html_version(doctype).to_string();
        }
    }
}

impl TokenSink for PageSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(&tag),
                TagKind::EndTag => self.end_tag(&tag),
            },
            Token::CharacterTokens(text) => self.text(&text),
            Token::DoctypeToken(doctype) => self.doctype(&doctype),
            Token::EOFToken => self.finish_title(),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn attr<'a>(tag: &'a Tag, name: &str) -> Option<&'a str> {
    tag.attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

/// Drives the tokenizer with decoded text; the UTF-8 decoding in front of it
/// comes from tendril's lossy stream decoder.
struct TokenFeeder {
    tokenizer: Tokenizer<PageSink>,
    input: BufferQueue,
}

impl TokenFeeder {
    fn new(base: Url) -> Self {
        Self {
            tokenizer: Tokenizer::new(PageSink::new(base), Default::default()),
            input: BufferQueue::default(),
        }
    }

    fn pump(&mut self) {
        // a script pause leaves input queued; keep feeding
        while let TokenizerResult::Script(()) = self.tokenizer.feed(&self.input) {
            log::trace!("tokenizer paused after a script, resuming");
        }
    }
}

impl TendrilSink<UTF8> for TokenFeeder {
    type Output = ParsedPage;

    fn process(&mut self, text: StrTendril) {
        if text.is_empty() {
            return;
        }
        self.input.push_back(text);
        self.pump();
    }

    fn error(&mut self, desc: Cow<'static, str>) {
        log::trace!("html decoding: {desc}");
    }

    fn finish(mut self) -> ParsedPage {
        self.pump();
        self.tokenizer.end();
        self.tokenizer.sink.page.take()
    }
}

/// Incremental extractor. Feed it chunks in order, then call [`finish`](Self::finish).
///
/// Chunks may split UTF-8 sequences anywhere; invalid bytes become U+FFFD.
pub struct HtmlExtractor {
    decoder: Utf8LossyDecoder<TokenFeeder>,
}

impl HtmlExtractor {
    pub fn new(base: Url) -> Self {
        Self {
            decoder: Utf8LossyDecoder::new(TokenFeeder::new(base)),
        }
    }

    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.decoder.process(ByteTendril::from_slice(bytes));
    }

    pub fn feed_str(&mut self, text: &str) {
        self.feed_bytes(text.as_bytes());
    }

    pub fn finish(self) -> ParsedPage {
        self.decoder.finish()
    }
}

/// Extracts page facts from an in-memory document.
pub fn parse_document(html: &str, base: &Url) -> ParsedPage {
    let mut extractor = HtmlExtractor::new(base.clone());
    extractor.feed_str(html);
    extractor.finish()
}

/// Extracts page facts from a blocking reader, one chunk at a time.
pub fn extract_from_reader<R: Read>(mut reader: R, base: &Url) -> Result<ParsedPage, ParseError> {
    let page = Utf8LossyDecoder::new(TokenFeeder::new(base.clone())).read_from(&mut reader)?;
    Ok(page)
}

/// Extracts page facts from an async body without buffering it whole.
///
/// Tokenizing runs on the blocking pool; the body is pulled through a
/// bridge, so a read error or a cancelled reader ends extraction there.
pub async fn extract<R>(reader: R, base: &Url) -> Result<ParsedPage, ParseError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let bridge = SyncIoBridge::new(reader);
    let base = base.clone();
    tokio::task::spawn_blocking(move || extract_from_reader(bridge, &base)).await?
}
