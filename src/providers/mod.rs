mod docx;
mod gdrive;
mod notion;
mod retry;

pub use docx::{ExtractedDocx, extract_docx};
pub use gdrive::{
    DriveApi, DriveChange, DriveChangeKind, DriveChangesPage, DriveFileListPage, DriveFileMeta, FakeDriveApi,
    HttpDriveApi,
};
pub use notion::{
    FakeNotionApi, HttpNotionApi, NotionApi, NotionBlockPayload, NotionPageSummary, NotionSearchPage,
};
