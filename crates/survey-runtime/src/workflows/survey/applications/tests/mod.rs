mod common;
mod journal;
mod service;
mod status;
