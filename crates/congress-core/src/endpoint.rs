//! Static catalog of Congress.gov endpoints the engine knows how to sync.

use serde::{Deserialize, Serialize};

use crate::json::render_template;

/// Page size for plain array endpoints.
pub const PAGE_SIZE: u64 = 250;
/// Page size when every record triggers a detail request.
pub const DETAIL_PAGE_SIZE: u64 = 50;
/// Field added to records when the endpoint injects the session number.
pub const SESSION_FIELD: &str = "congress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Paginated list with an incremental update window.
    Array,
    /// A single payload per session; no pagination, no window.
    Object,
}

/// Secondary per-record request whose result is attached under `detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailDescriptor {
    /// Path relative to the API base with `{field}` placeholders, e.g. `member/{bioguideId}`.
    pub url_template: String,
    pub records_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Cursor state key.
    pub name: String,
    /// Destination table for upserts.
    pub table: String,
    /// Path relative to the API base with a `{session}` placeholder.
    pub path_template: String,
    /// Dot-path to the record(s) inside the response body.
    pub records_path: String,
    pub shape: ResponseShape,
    pub inject_session: bool,
    pub detail: Option<DetailDescriptor>,
}

impl EndpointDescriptor {
    fn array(name: &str, table: &str, path: &str, records: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            path_template: path.to_string(),
            records_path: records.to_string(),
            shape: ResponseShape::Array,
            inject_session: false,
            detail: None,
        }
    }

    fn object(name: &str, table: &str, path: &str, records: &str) -> Self {
        Self {
            shape: ResponseShape::Object,
            ..Self::array(name, table, path, records)
        }
    }

    fn with_session_field(mut self) -> Self {
        self.inject_session = true;
        self
    }

    fn with_detail(mut self, url_template: &str, records_path: &str) -> Self {
        self.detail = Some(DetailDescriptor {
            url_template: url_template.to_string(),
            records_path: records_path.to_string(),
        });
        self
    }

    /// Request path for one session.
    pub fn path_for(&self, session: u32) -> String {
        render_template(
            &self.path_template,
            &serde_json::json!({ "session": session }),
        )
    }

    /// Records requested per page. Smaller when each record fans out into a
    /// detail request.
    pub fn page_size(&self) -> u64 {
        if self.detail.is_some() {
            DETAIL_PAGE_SIZE
        } else {
            PAGE_SIZE
        }
    }
}

/// Every supported endpoint, in sync order.
pub fn catalog() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor::array("bill", "bill", "bill/{session}", "bills"),
        EndpointDescriptor::object("congress", "congress", "congress/{session}", "congress"),
        EndpointDescriptor::array("member", "member", "member/congress/{session}", "members")
            .with_session_field()
            .with_detail("member/{bioguideId}", "member"),
        EndpointDescriptor::array("committee", "committee", "committee/{session}", "committees")
            .with_session_field(),
        EndpointDescriptor::array("amendment", "amendment", "amendment/{session}", "amendments"),
        EndpointDescriptor::array("hearing", "hearing", "hearing/{session}", "hearings"),
        EndpointDescriptor::array(
            "houseCommunication",
            "house_communication",
            "house-communication/{session}",
            "houseCommunications",
        ),
        EndpointDescriptor::array(
            "senateCommunication",
            "senate_communication",
            "senate-communication/{session}",
            "senateCommunications",
        ),
        EndpointDescriptor::array("nomination", "nomination", "nomination/{session}", "nominations"),
        EndpointDescriptor::array("treaty", "treaty", "treaty/{session}", "treaties"),
    ]
}

/// Look up a catalog entry by its cursor name.
pub fn find(name: &str) -> Option<EndpointDescriptor> {
    catalog().into_iter().find(|e| e.name == name)
}
