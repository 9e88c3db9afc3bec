pub mod stub_upstream;
