//! GPU resource tables
//!
//! Every resource kind lives in a fixed-capacity [`SlotTable`] and is
//! handed out as a generation-checked [`Handle`]. The pools on top add the
//! kind-specific parts: native object creation, device-loss handling and
//! byte accounting.

pub mod buffers;
pub mod fonts;
pub mod image_loader;
pub mod slot_table;
pub mod textures;
pub mod tx_format;

pub use buffers::{
    BufferLock, BufferPool, IndexBufferHandle, IndexBufferPool, VertexBufferHandle,
    VertexBufferPool,
};
pub use fonts::{
    FontAtlas, FontHandle, FontLoader, FontTable, FontVertex, GlyphInfo, ManifestFontLoader,
    TextAlign,
};
pub use image_loader::{load_image_from_file, load_image_from_memory, DecodedImage};
pub use slot_table::{Acquired, Handle, ReleasePolicy, Released, SlotTable};
pub use textures::{TextureHandle, TextureInfo, TexturePool, TextureSource, MAX_SEARCH_PATHS};
pub use tx_format::{TxError, TxHeader, TxImage};
