mod helpers;

mod tests_derived;
