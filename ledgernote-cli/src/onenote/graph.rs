//! Microsoft Graph OneNote endpoints used by the sync.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::SyncError;
use super::auth::HTTP_TIMEOUT;

pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0/me/onenote";
const ERROR_BODY_LIMIT: usize = 500;

/// A notebook, section or page: id plus its display name (or page title).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneNoteItem {
    pub id: String,
    pub name: String,
    pub web_url: Option<String>,
}

pub trait OneNoteApi {
    fn list_notebooks(&self) -> Result<Vec<OneNoteItem>, SyncError>;
    fn create_notebook(&self, name: &str) -> Result<OneNoteItem, SyncError>;
    fn list_sections(&self, notebook_id: &str) -> Result<Vec<OneNoteItem>, SyncError>;
    fn create_section(&self, notebook_id: &str, name: &str) -> Result<OneNoteItem, SyncError>;
    fn list_pages(&self, section_id: &str) -> Result<Vec<OneNoteItem>, SyncError>;
    /// Create a page from a full HTML document.
    fn create_page(&self, section_id: &str, document: &str) -> Result<OneNoteItem, SyncError>;
    /// Replace the element with `data-id = element_id` on an existing page.
    fn replace_element(&self, page_id: &str, element_id: &str, html: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    id: String,
    display_name: Option<String>,
    title: Option<String>,
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(rename = "oneNoteWebUrl")]
    one_note_web_url: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

impl From<RawItem> for OneNoteItem {
    fn from(raw: RawItem) -> Self {
        Self {
            id: raw.id,
            name: raw.display_name.or(raw.title).unwrap_or_default(),
            web_url: raw.links.and_then(|l| l.one_note_web_url).map(|h| h.href),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Parse a 2xx body; a body that is not the expected JSON is a `Decode` error.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|e| {
        let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        SyncError::Decode(format!("{e}: {excerpt}"))
    })
}

pub struct GraphClient {
    http: Client,
    token: String,
    base: String,
}

impl GraphClient {
    pub fn new(access_token: String) -> Result<Self, SyncError> {
        Ok(Self {
            http: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            token: access_token,
            base: GRAPH_BASE.to_string(),
        })
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, SyncError> {
        let resp = req.bearer_auth(&self.token).send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body: String = resp
            .text()
            .unwrap_or_default()
            .chars()
            .take(ERROR_BODY_LIMIT)
            .collect();
        Err(SyncError::Api {
            status: status.as_u16(),
            body,
        })
    }

    fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, SyncError> {
        decode(&self.send(req)?.text()?)
    }

    /// GET `url` and every `@odata.nextLink` after it.
    fn get_all(&self, url: String) -> Result<Vec<OneNoteItem>, SyncError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: Listing<RawItem> = self.send_json(self.http.get(&url))?;
            items.extend(page.value.into_iter().map(OneNoteItem::from));
            next = page.next_link;
        }
        Ok(items)
    }

    fn create_named(&self, url: String, name: &str) -> Result<OneNoteItem, SyncError> {
        let raw: RawItem = self.send_json(self.http.post(url).json(&json!({ "displayName": name })))?;
        Ok(raw.into())
    }
}

impl OneNoteApi for GraphClient {
    fn list_notebooks(&self) -> Result<Vec<OneNoteItem>, SyncError> {
        self.get_all(format!("{}/notebooks?$select=id,displayName", self.base))
    }

    fn create_notebook(&self, name: &str) -> Result<OneNoteItem, SyncError> {
        self.create_named(format!("{}/notebooks", self.base), name)
    }

    fn list_sections(&self, notebook_id: &str) -> Result<Vec<OneNoteItem>, SyncError> {
        self.get_all(format!(
            "{}/notebooks/{notebook_id}/sections?$select=id,displayName",
            self.base
        ))
    }

    fn create_section(&self, notebook_id: &str, name: &str) -> Result<OneNoteItem, SyncError> {
        self.create_named(format!("{}/notebooks/{notebook_id}/sections", self.base), name)
    }

    fn list_pages(&self, section_id: &str) -> Result<Vec<OneNoteItem>, SyncError> {
        self.get_all(format!(
            "{}/sections/{section_id}/pages?$select=id,title,links",
            self.base
        ))
    }

    fn create_page(&self, section_id: &str, document: &str) -> Result<OneNoteItem, SyncError> {
        let req = self
            .http
            .post(format!("{}/sections/{section_id}/pages", self.base))
            .header(CONTENT_TYPE, "text/html")
            .body(document.to_string());
        let raw: RawItem = self.send_json(req)?;
        Ok(raw.into())
    }

    fn replace_element(&self, page_id: &str, element_id: &str, html: &str) -> Result<(), SyncError> {
        let patch = json!([{
            "target": format!("#{element_id}"),
            "action": "replace",
            "content": html,
        }]);
        self.send(
            self.http
                .patch(format!("{}/pages/{page_id}/content", self.base))
                .json(&patch),
        )?;
        Ok(())
    }
}
