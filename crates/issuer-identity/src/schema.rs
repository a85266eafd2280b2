use issuer_types::IssuerResult;

/// External capability mapping `(schema_url, type, raw_data)` to encoded
/// claim data slots and a schema hash. Schema fetching and JSON-LD
/// validation are deliberately out of this core's scope — it only
/// consumes the result through this trait.
pub trait SchemaProcessor: Send + Sync {
    fn process(
        &self,
        schema_url: &str,
        claim_type: &str,
        data: &serde_json::Value,
    ) -> IssuerResult<(Vec<[u8; 32]>, [u8; 16])>;
}

/// Content-addressed cache for fetched schema bytes, keyed by a hash of the
/// schema URL. Left as a pluggable capability with no bundled
/// implementation, since its consistency model (TTL, invalidation, shared
/// vs. per-process) is a deployment decision, not a core one; a loader
/// without one simply falls through to direct fetch via
/// [`SchemaTransport`].
pub trait SchemaCache: Send + Sync {
    fn get(&self, url_hash: &[u8]) -> IssuerResult<Option<Vec<u8>>>;
    fn put(&self, url_hash: &[u8], bytes: &[u8]) -> IssuerResult<()>;
}

/// Where to fetch raw schema bytes from. A schema loader selects between
/// `http(s)` and `ipfs` transports at runtime based on this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaSource {
    Http { url: String },
    Ipfs { cid: String },
}

/// Performs the actual fetch for a [`SchemaSource`]. Like
/// [`SchemaProcessor`], this is an external collaborator — HTTP/IPFS
/// transport is out of this core's scope.
pub trait SchemaTransport: Send + Sync {
    fn load(&self, source: &SchemaSource) -> IssuerResult<Vec<u8>>;
}
