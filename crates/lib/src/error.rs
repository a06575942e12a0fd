use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Originator configuration error")]
    Config(#[from] crate::batch::ConfigError),
    #[error("Batch assembly error")]
    Assembly(#[from] crate::batch::AssemblyError),
    #[error("Ledger store error")]
    Store(#[from] crate::ledger::StoreError),
}
