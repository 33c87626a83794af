use std::ffi::CString;

pub struct Info {
    pub app_name: CString,
    pub app_version: u32,
    pub engine_name: CString,
    pub engine_version: u32,
}

pub fn new(app_name: &str, app_version: u32) -> Info {
    Info {
        // interior NULs cannot cross into Vulkan; drop them rather than fail
        app_name: CString::new(app_name.replace('\0', "")).unwrap_or_default(),
        app_version,
        engine_name: c"ripple".to_owned(),
        engine_version: make_version(0, 0, 1, 0),
    }
}

pub const fn make_version(variant: u32, major: u32, minor: u32, patch: u32) -> u32 {
    ((variant) << 29) | ((major) << 22) | ((minor) << 12) | (patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_vulkan_packing() {
        assert_eq!(make_version(0, 1, 3, 0), ash::vk::make_api_version(0, 1, 3, 0));
    }

    #[test]
    fn app_name_survives_interior_nul() {
        let info = new("vie\0wer", 1);
        assert_eq!(info.app_name.to_str().unwrap(), "viewer");
    }
}
