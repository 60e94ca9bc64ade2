pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod value;
}

pub mod protocol {
    pub mod domain {
        pub mod envelope;
        pub mod error;
        pub mod event;
        pub mod result_state;
    }
    pub mod infrastructure;
}

pub mod worker {
    pub mod domain {
        pub mod engine;
        pub mod handle_table;
        pub mod module_loader;
        pub mod runner_callbacks;
    }
    pub mod infrastructure;
}

pub mod proxy {
    pub mod engine_proxy;
    pub mod payload;
    pub mod proxy_error;
    pub mod recognizer_proxy;
    pub mod runner_proxy;
}

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod scanning {
    pub mod clock;
    pub mod frame_pump;
    pub mod recognition_runner;
    pub mod recognize_image_use_case;
    pub mod scan_logger;
    pub mod scan_state;
    pub mod throttle;
    pub mod timeout_clock;
    pub mod video_recognizer;
}
