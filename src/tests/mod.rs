#[cfg(test)]
mod support;



#[cfg(test)]
mod pane_tests;
