//! Id hook: identifiers that stay put for an instance's lifetime.

use crate::engine::Engine;
use crate::error::Result;

impl Engine {
    /// An identifier unique within this engine, e.g. `":s3:"`.
    ///
    /// Generated on the first render of the slot and returned unchanged
    /// afterwards. Meant for pairing labels and inputs, not as a key.
    pub fn use_id(&self) -> Result<String> {
        let (id, slot) = self.next_slot("use_id")?;
        self.state_or_init(id, slot, || {
            let mut store = self.store();
            store.next_hook_id += 1;
            format!(":s{}:", store.next_hook_id)
        })
    }
}
