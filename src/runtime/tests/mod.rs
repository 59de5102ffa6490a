mod helpers;

mod eval_tests;
mod image_tests;
