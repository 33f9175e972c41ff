use httpkit::{Attachment, Bytes, Router, StatusError};

pub struct Download {
    #[param(path)]
    pub name: String,
}

impl Download {
    fn path(&self) -> &'static str {
        "/files/:name"
    }

    fn output(&self) -> Result<Attachment, StatusError> {
        Ok(Attachment::new("report.csv", "text/csv"))
    }
}

pub struct Upload {
    #[param(multipart)]
    pub file: Bytes,
    #[param(multipart)]
    pub comment: Option<String>,
}

impl Upload {
    fn method(&self) -> &'static str {
        "POST"
    }

    fn path(&self) -> &'static str {
        "/files"
    }

    fn output(&self) -> Result<(), StatusError> {
        Ok(())
    }
}

pub struct Stats;

impl Stats {
    fn path(&self) -> &'static str {
        "/stats"
    }
}

pub fn routes() -> Router {
    let storage = router![Group::new("/storage")];
    storage.register(router![Download]);
    storage.register(router![Upload]);
    let extra = router![];
    extra.attach([Stats]);
    storage.register(extra);
    storage
}
