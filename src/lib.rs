pub mod shared {
    pub mod infrastructure {
        pub mod async_executor;
        pub mod scheduling;
    }
}

pub mod shell;
