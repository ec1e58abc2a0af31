// Validation layer diagnostics
//
// Messages from the validation layer are forwarded to the `log` facade.
// The callback never aborts the call that triggered it.

use super::device::InstanceContext;
use super::error::{RenderResult, RendererError};
use super::owner::{owned, ResourceOwner};
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

pub fn level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

pub fn create_messenger(
    instance: &Arc<InstanceContext>,
) -> RenderResult<ResourceOwner<vk::DebugUtilsMessengerEXT>> {
    let debug_utils = instance.loaders.debug_utils()?.clone();

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(RendererError::query("vkCreateDebugUtilsMessengerEXT"))?;

    Ok(owned(instance, messenger, move |_: &InstanceContext, messenger| unsafe {
        debug_utils.destroy_debug_utils_messenger(messenger, None);
    }))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;

    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    let object_type = if data.object_count > 0 && !data.p_objects.is_null() {
        (*data.p_objects).object_type
    } else {
        vk::ObjectType::UNKNOWN
    };

    log::log!(
        level_for(message_severity),
        "[Vulkan][{:?}][{:?}] {}",
        message_type,
        object_type,
        message
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_to_log_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        assert_eq!(level_for(Severity::ERROR), log::Level::Error);
        assert_eq!(level_for(Severity::WARNING), log::Level::Warn);
        assert_eq!(level_for(Severity::INFO), log::Level::Debug);
        assert_eq!(level_for(Severity::VERBOSE), log::Level::Trace);
        assert_eq!(level_for(Severity::WARNING | Severity::ERROR), log::Level::Error);
    }

    #[test]
    fn callback_always_continues() {
        let message = c"validation message";
        let data = vk::DebugUtilsMessengerCallbackDataEXT::builder()
            .message(message)
            .build();

        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }
}
