pub mod frm32;
