use tracing::info;

use crate::cli::commands::{CompactArgs, DeleteSessionArgs, DiscardSessionArgs};
use crate::errors::StoreError;

pub fn handle_compact(args: CompactArgs) -> Result<(), StoreError> {
    let db = args.store.open()?;
    let locator = db.locator().unwrap_or_default();
    db.close(true, args.cleanup)?;
    println!("Compacted {}", locator);
    Ok(())
}

pub fn handle_delete_session(args: DeleteSessionArgs) -> Result<(), StoreError> {
    // the embedded backend deletes files without opening anything
    let db = if args.store.has_locator() { args.store.open()? } else { args.store.database()? };
    info!(session = %args.name, backend = db.backend_name(), "Deleting session");
    db.delete_session(&args.name)?;
    println!("Deleted session {}", args.name);
    db.close(false, false)
}

pub fn handle_discard_session(args: DiscardSessionArgs) -> Result<(), StoreError> {
    let db = args.store.open()?;
    db.discard_session(args.session_id)?;
    println!("Discarded session {}", args.session_id);
    db.close(false, false)
}
