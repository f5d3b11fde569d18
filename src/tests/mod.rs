use fixture::Fixture;

pub mod fixture;

mod starter;
