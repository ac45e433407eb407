use kb_core::tools::{KB_ADD_NOTE, KB_INGEST, KB_SEARCH};
use rmcp::{
    ErrorData,
    model::{CallToolResult, JsonObject},
    tool,
    tool_router,
};

use crate::KbMcp;

// Handlers take the raw argument object; descriptions and input schemas are
// filled in from the bridge catalog by `KbMcp::with_bridge`.
#[tool_router(router = tool_router_kb, vis = "pub(crate)")]
impl KbMcp {
    #[tool]
    async fn kb_search(&self, arguments: JsonObject) -> Result<CallToolResult, ErrorData> {
        self.dispatch(KB_SEARCH, arguments).await
    }

    #[tool]
    async fn kb_add_note(&self, arguments: JsonObject) -> Result<CallToolResult, ErrorData> {
        self.dispatch(KB_ADD_NOTE, arguments).await
    }

    #[tool]
    async fn kb_ingest(&self, arguments: JsonObject) -> Result<CallToolResult, ErrorData> {
        self.dispatch(KB_INGEST, arguments).await
    }
}
